use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to read option record from {}, error: {source}", file_path.display()))]
    ReadRecord { file_path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to write option record to {}, error: {source}", file_path.display()))]
    WriteRecord { file_path: PathBuf, source: std::io::Error },

    #[snafu(display("Invalid port value '{value}' in option record, error: {source}"))]
    InvalidPort { value: String, source: std::num::ParseIntError },

    #[snafu(display(
        "No SSH identity is available; pass `--identity` once and it will be remembered"
    ))]
    NoIdentity,
}
