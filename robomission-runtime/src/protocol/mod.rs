// Copyright (C) 2024 Laixer Equipment B.V.
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

//! Controller protocol.
//!
//! The bridge forwards newline terminated ASCII lines to the controller.
//! Every outbound line names the target device followed by a control
//! keyword, for example `regbot madd vel=0.5, edger=0:dist=2.5`. Inbound
//! lines are either event notifications (`event 0`) or controller chatter.

pub mod channel;
pub mod instruction;

pub use self::channel::{Channel, ChannelError};
pub use self::instruction::{parse_event, parse_listing, Instruction, ListingError, ParseError};
