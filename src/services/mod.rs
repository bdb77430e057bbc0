pub mod media_store;
pub mod pdf_folders;
pub mod transcode;
pub mod upload;
