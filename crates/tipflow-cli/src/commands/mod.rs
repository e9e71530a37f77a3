pub mod init;
pub mod labware;
pub mod plan;
