// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera access
//!
//! The session controller never touches hardware directly. It talks to a
//! [`camera::DecodePlatform`], which enumerates devices and runs the decode
//! engine:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Session Controller             │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │                Backend Layer                │
//! │  ┌────────────┐ ┌─────────────┐ ┌────────┐  │
//! │  │    V4L2    │ │ Still image │ │Scripted│  │
//! │  └────────────┘ └─────────────┘ └────────┘  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
