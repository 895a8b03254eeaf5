//! # Marathon cluster membership
//!
//! A client may be pointed at several Marathon masters at once
//! (`http://m1:8080,m2:8080,m3:8080`). Requests go to one member at a time;
//! a member that fails at the transport level is taken out of rotation and
//! probed in the background until it answers `/ping` again.
//!
//! ```text
//!            next()                    mark_down(m2)
//!   ┌────┐   ┌────┐   ┌────┐          ┌────┐   ┌────┐   ┌────┐
//!   │ m1 │──▶│ m2 │──▶│ m3 │          │ m1 │   │ m2 │   │ m3 │
//!   └────┘   └────┘   └────┘          └────┘   └─┬──┘   └────┘
//!      ▲                 │                       │ GET /ping every
//!      └─────────────────┘                       ▼ probe interval
//!                                          back in rotation on 200
//! ```

pub mod probe;
pub mod ring;

pub use probe::{probe_member, ProbeConfig, PING_PATH};
pub use ring::{ClusterError, EndpointRing, Member, MemberStatus};
