use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to read the SSH public key file {}, error: {source}", file_path.display()))]
    ReadPublicKey { file_path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to read the SSH private key file {}, error: {source}", file_path.display()))]
    ReadPrivateKey { file_path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to parse the SSH private key {}", file_path.display()))]
    ParsePrivateKey { file_path: PathBuf },

    #[snafu(display("Failed to generate a jump keypair"))]
    GenerateKey,

    #[snafu(display("Failed to serialize SSH key material"))]
    SerializeKey,

    #[snafu(display("Failed to write the key file {}, error: {source}", file_path.display()))]
    WriteKey { file_path: PathBuf, source: std::io::Error },
}
