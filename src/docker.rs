mod client;
mod detect;
mod error;
pub mod explorer;
pub mod logstream;
mod manager;
mod models;

pub use client::{Client, LogStream, SHORT_ID_LEN, short_id};
pub use detect::{SelfIdentity, detect};
pub use error::{Error, Result};
pub use manager::Manager;
pub use models::{
    ContainerDetail, ContainerSummary, MountEntry, NetworkAttachment, PortBinding, RestartPolicy,
    VolumeFileContent, VolumeFileEntry, VolumeSummary,
};
