//! vsPlay Environment Abstraction Layer
//!
//! This crate provides the runtime seam between the vsPlay reconciliation
//! engine and whatever drives it: the **Production** runtime (tokio) or the
//! deterministic **Simulation** harness in `vsplay_sim`.
//!
//! # Core Concept: Single-Owner Dispatch
//!
//! The engine owns all of its state and is only ever mutated from one task.
//! Background producers (video/track/descriptor sources) never touch that
//! state directly; they hand their updates off through a [`MailboxSender`]
//! and the dispatch task applies them in arrival order.
//!
//! - Time (`now()`, `sleep()`)
//! - Spawning (`spawn()`)
//! - Hand-off (`mailbox()`)
//!
//! # Example
//!
//! ```ignore
//! use vsplay_env::{mailbox, VsContext};
//!
//! async fn pump<Ctx: VsContext>(ctx: &Ctx) {
//!     let (tx, mut rx) = mailbox::<u32>();
//!     ctx.spawn("producer", async move {
//!         let _ = tx.post(7);
//!     });
//!     while let Some(msg) = rx.recv().await {
//!         handle(msg);
//!     }
//! }
//! ```

mod context;
mod error;
mod mailbox;
mod tokio_impl;
mod types;

pub use context::VsContext;
pub use error::EnvError;
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender};
pub use tokio_impl::TokioContext;
pub use types::{DataSourceStatus, SourceId};
