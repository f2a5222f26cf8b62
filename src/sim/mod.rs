//! Game simulation
//!
//! All gameplay logic lives here and runs single-threaded:
//! - Time comes from a `Clock`, never from the system directly
//! - Randomness comes from the session's seeded RNG
//! - Deferred work goes through one `Scheduler`
//! - Drawing goes through a `Surface`; no platform dependencies

pub mod clock;
pub mod engine;
pub mod player;
pub mod scheduler;
pub mod session;
pub mod sprite;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Target, ThinkTime, TurnEngine};
pub use player::{Player, Role};
pub use scheduler::{Scheduler, Task};
pub use session::{DeliveryStatus, EndReason, Phase, Session};
pub use sprite::{Appearance, EntityId, Sprite, SpriteError, SpriteSheet};
