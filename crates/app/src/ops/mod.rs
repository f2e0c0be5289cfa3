pub mod download;
pub mod init;
pub mod ls;
pub mod reconcile;
pub mod revoke;
pub mod share;
pub mod upload;
pub mod version;

pub use download::Download;
pub use init::Init;
pub use ls::Ls;
pub use reconcile::Reconcile;
pub use revoke::Revoke;
pub use share::Share;
pub use upload::Upload;
pub use version::Version;

use common::crypto::{KeyError, PublicKey};

/// Clap parser for hex-encoded identity keys.
pub(crate) fn parse_public_key(s: &str) -> Result<PublicKey, KeyError> {
    PublicKey::from_hex(s)
}
