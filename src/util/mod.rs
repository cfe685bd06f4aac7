pub mod init;
pub mod io;
