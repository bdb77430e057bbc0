//! Shared application state handed to every handler.

use crate::services::{media_store::MediaStore, transcode::TranscodeRunner};

#[derive(Clone)]
pub struct AppState {
    pub store: MediaStore,
    pub runner: TranscodeRunner,
}
