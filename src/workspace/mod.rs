//! Ephemeral, per-session workspaces.
//!
//! A workspace is the single host directory bound into the sandbox for one
//! verification session. Names are derived from server-generated session
//! ids, so concurrent sessions never observe each other's files.
//!
//! # Example
//!
//! ```ignore
//! use r2r::workspace::{SessionId, WorkspaceManager};
//!
//! let manager = WorkspaceManager::new("/var/tmp/r2r-workspaces");
//! let session = SessionId::generate();
//! let workspace = manager.acquire(&session)?;
//! workspace.write_file("verify.py", "print('LOSS_START: 1.0')")?;
//! manager.release(&workspace);
//! ```

pub mod manager;
pub mod session;

pub use manager::{Workspace, WorkspaceManager};
pub use session::SessionId;
