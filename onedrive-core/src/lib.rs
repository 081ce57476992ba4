mod client;
mod oauth;

pub use client::{
    ApiErrorClass, ChangeSet, DriveItem, FileFacet, FileSystemInfo, HashFacet, OneDriveClient,
    OneDriveError, ParentReference,
};
pub use oauth::{OAuthClient, OAuthError, OAuthToken};
