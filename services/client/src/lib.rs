//! Xiaoyue Client Library Crate
//!
//! The client side of the Xiaoyue language tutor: the WebSocket link to the
//! tutor server, frame routing into the session store, outbound commands and
//! voice-line playback. The `xiaoyue` binary is a thin terminal front end over
//! [`ws::Session`].

pub mod audio_utils;
pub mod config;
pub mod playback;
pub mod ws;
