//! Core types for the Cognizance assistant
//!
//! This crate provides the foundational types shared by every other crate:
//! - Conversation turns and caller-supplied history
//! - The umbrella error type

pub mod conversation;
pub mod error;

pub use conversation::{ConversationHistory, ConversationTurn, TurnRole};
pub use error::{Error, Result};
