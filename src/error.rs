use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap_file::PcapError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{}: missing header row", .0.display())]
    MissingHeader(PathBuf),
    #[error("unsupported capture link type: {0}")]
    UnsupportedLinkType(String),
    #[error("pcapng packet on undeclared interface {0}")]
    UnknownInterface(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
