//! Microsoft Graph access: HTTP plumbing, models and the drive client

pub mod http_client;
pub mod onedrive_client;
pub mod onedrive_models;
pub mod path_utils;

pub use onedrive_client::{OneDriveClient, OneDriveClientTrait};
