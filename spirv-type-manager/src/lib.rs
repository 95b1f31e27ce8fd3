// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! keeps track of the types declared in a SPIR-V module.
//!
//! each structurally distinct type is stored once in a [`TypePool`], no
//! matter how many `<id>`s declare it. [`TypeManager`] maps between those
//! `<id>`s and the pooled types, and declares new types in the module on
//! request.

mod diagnostics;
mod forward_pointer;
mod manager;
mod pool;
mod types;

pub use diagnostics::{log_message_consumer, Message, MessageConsumer, MessageLevel};
pub use manager::TypeManager;
pub use pool::{TypeHandle, TypePool};
pub use types::{
    Array, DecorationRecord, Float, ForwardPointer, Function, Image, Integer, Matrix, Opaque, Pipe,
    Pointer, RuntimeArray, SampledImage, Struct, Type, TypeData, TypeKind, TypeRef, Vector,
};
