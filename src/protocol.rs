//! Shared protocol constants for the ferry metadata framing

// Wire layout (client -> server):
//   LENGTH (metadata_width bytes, ASCII decimal, left-justified, space padded)
//   PAYLOAD ("<filename>/<filesize>", exactly LENGTH bytes)
//   BODY (exactly <filesize> raw bytes, no further framing)

/// Separator between filename and size inside the metadata payload
pub const SEPARATOR: char = '/';

/// Padding byte used to left-justify the length prefix
pub const PAD: u8 = b' ';

// Maximum metadata payload size (64KB) - prevents DoS via memory exhaustion
// from a forged length prefix
pub const MAX_METADATA_LEN: usize = 64 * 1024;

// Upper bound on the configurable length-prefix width
pub const MAX_METADATA_WIDTH: usize = 64;

// Upper bound on the configurable read size (16MB); the server allocates one
// buffer of this size up front
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Receipt log kept in the target directory, one line per completed transfer
pub const RECEIPT_LOG_NAME: &str = "file_attributes.txt";

// Defaults, overridable through config file, environment or CLI
pub mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 12345;
    pub const METADATA_WIDTH: usize = 16;
    pub const CHUNK_SIZE: usize = 4096;
}

// Environment variable names shared with older deployments' .env files
pub mod env {
    pub const METADATA_WIDTH: &str = "METADATA_LENGTH_SIZE";
    pub const CHUNK_SIZE: &str = "CONNECTION_BUFSIZE";
}

// Fixed mio tokens; client connections are numbered from CONNECTION_START
pub mod tokens {
    pub const LISTENER: usize = 0;
    pub const WAKER: usize = 1;
    pub const CONNECTION_START: usize = 2;
}
