//! vsPlay Core - Track/Event Reconciliation Engine
//!
//! Aggregates asynchronous track, event, descriptor and frame-metadata
//! updates from pluggable sources into one consistent, displayable model:
//! 1. **Homography deferral**: image-space data waits until the frame's
//!    stabilization homography is known, then is replayed in time order
//! 2. **Event merge**: events are admitted only once their tracks exist and
//!    re-submissions from a source update the existing event in place
//! 3. **Descriptor fan-out**: every accepted mutation is re-broadcast as a
//!    typed input, with history replay for late-attaching consumers
//!
//! Alerts, contours and the built-in tripwire descriptor sit on top of the
//! fan-out; `persistence` reads and writes alert and filter files, and
//! `feed` replays archived sources into a running service.

pub mod alert;
pub mod config;
pub mod contour;
pub mod descriptor;
pub mod descriptor_input;
pub mod engine;
pub mod event;
pub mod event_types;
pub mod feed;
pub mod geometry;
pub mod homography;
pub mod metadata;
pub mod notification;
pub mod persistence;
pub mod service;
pub mod source;
pub mod timestamp;
pub mod track;
pub mod tripwire;

// Re-export key types for convenience
pub use alert::{Alert, SimilarityQuery};
pub use config::{ConfigError, CoreConfig};
pub use contour::{Contour, ContourType};
pub use descriptor_input::{DescriptorInput, InputId, InputKind, InputKinds};
pub use engine::{Core, CoreError, QueryFormulationData};
pub use event::{Event, EventId, EventOrigin, EventRating};
pub use event_types::{Color, EventGroup, EventInfo, EventTypeId};
pub use feed::ArchivedFeed;
pub use homography::Homography;
pub use metadata::FrameMetadata;
pub use notification::{CoreNotification, SourceKind};
pub use persistence::{FilterSettings, PersistenceError};
pub use service::{CoreHandle, CoreMessage, CoreService};
pub use source::{DescriptorSource, SourceOutput};
pub use timestamp::TimeStamp;
pub use track::{TrackId, TrackModelId, TrackState};
pub use tripwire::TripwireDescriptor;
