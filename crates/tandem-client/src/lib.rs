//! Client-side projection of a session.
//!
//! The server is the only authority; this crate re-derives everything a
//! client renders — whose turn it is, unread badges, media countdowns —
//! from the latest pushed snapshot. A reconnecting client throws its
//! derived state away and rebuilds from the next push.

pub mod subscription;
pub mod timer;
pub mod view;

pub use subscription::Subscription;
pub use timer::Countdown;
pub use view::SessionView;
