// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

use crate::diagnostics::{log_message_consumer, Message, MessageConsumer, MessageLevel};
use crate::forward_pointer::ForwardPointerRegistry;
use crate::pool::{TypeHandle, TypePool};
use crate::types::{
    Array, DecorationRecord, Float, ForwardPointer, Function, Image, Integer, Matrix, Opaque, Pipe,
    Pointer, RuntimeArray, SampledImage, Struct, Type, TypeData, TypeRef, Vector,
};
use hashbrown::{HashMap, HashSet};
use spirv_id_map::IdMap;
use spirv_ir::rspirv::spirv::BuiltIn;
use spirv_ir::{
    id_in_operand, is_annotation_opcode, is_type_opcode, literal_in_operand, AccessQualifier,
    Assemble, Decoration, Instruction, IrContext, Op, Operand, StorageClass, Word,
};
use std::convert::Infallible;
use std::fmt;
use std::mem;

fn literal(instruction: &Instruction, index: usize) -> u32 {
    literal_in_operand(instruction, index).expect("known to be a literal number")
}

fn id_operand(instruction: &Instruction, index: usize) -> Word {
    id_in_operand(instruction, index).expect("known to be an <id> operand")
}

fn storage_class_operand(instruction: &Instruction, index: usize) -> StorageClass {
    match instruction.operands.get(index) {
        Some(&Operand::StorageClass(v)) => v,
        _ => panic!("known to be a StorageClass"),
    }
}

fn access_qualifier_operand(instruction: &Instruction, index: usize) -> Option<AccessQualifier> {
    match instruction.operands.get(index)? {
        &Operand::AccessQualifier(v) => Some(v),
        _ => None,
    }
}

/// the decoration and its parameters as they are encoded in the binary,
/// skipping the opcode word and the `skip - 1` operands before the decoration
fn decoration_words(instruction: &Instruction, skip: usize) -> DecorationRecord {
    let words = instruction.assemble();
    words.get(skip..).map(<[u32]>::to_vec).unwrap_or_default()
}

fn decoration_parameter(kind: Option<Decoration>, word: u32) -> Operand {
    match (kind, BuiltIn::from_u32(word)) {
        (Some(Decoration::BuiltIn), Some(built_in)) => Operand::BuiltIn(built_in),
        _ => Operand::LiteralBit32(word),
    }
}

/// tracks every type declared in a module, keeping one canonical copy of
/// each structurally distinct type and the `<id>`s it is declared by.
///
/// several `<id>`s can map to the same type; the first one recorded is the
/// one [`get_id`](Self::get_id) returns. forward pointers never have an
/// `<id>` of their own: they stand for the pointer they declare.
pub struct TypeManager {
    consumer: MessageConsumer,
    pool: TypePool,
    id_to_type: IdMap<Word, TypeHandle>,
    type_to_id: HashMap<TypeHandle, Word>,
    forward_pointers: ForwardPointerRegistry,
    /// target and storage class of every `OpTypeForwardPointer` in the module
    declared_forward_pointers: HashSet<(Word, StorageClass)>,
    /// pointers that got an `<id>` through `OpTypeForwardPointer` and still
    /// need their `OpTypePointer`
    deferred_pointers: Vec<(Word, TypeHandle)>,
}

impl fmt::Debug for TypeManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TypeManager")
            .field("pool", &self.pool)
            .field("id_to_type", &self.id_to_type)
            .field("type_to_id", &self.type_to_id)
            .field("forward_pointers", &self.forward_pointers)
            .field("declared_forward_pointers", &self.declared_forward_pointers)
            .finish()
    }
}

impl TypeManager {
    /// analyze every type in `context`, reporting diagnostics through `log`
    pub fn new(context: &IrContext) -> Self {
        Self::with_message_consumer(context, log_message_consumer())
    }
    /// analyze every type in `context`, reporting diagnostics to `consumer`
    pub fn with_message_consumer(context: &IrContext, consumer: MessageConsumer) -> Self {
        let bound = context.module().header.as_ref().map_or(1, |header| header.bound);
        let mut retval = Self {
            consumer,
            pool: TypePool::new(),
            id_to_type: IdMap::with_bound(bound),
            type_to_id: HashMap::new(),
            forward_pointers: ForwardPointerRegistry::default(),
            declared_forward_pointers: HashSet::new(),
            deferred_pointers: Vec::new(),
        };
        retval.analyze_types(context);
        retval
    }
    fn report(&mut self, level: MessageLevel, text: String) {
        (self.consumer)(&Message { level, text });
    }
    /// the pool holding every type known to `self`
    pub fn pool(&self) -> &TypePool {
        &self.pool
    }
    pub fn get_type(&self, id: Word) -> Option<&Type> {
        self.get_type_handle(id).map(|handle| self.pool.get(handle))
    }
    pub fn get_type_handle(&self, id: Word) -> Option<TypeHandle> {
        self.id_to_type.get(id).ok().flatten().copied()
    }
    /// the representative `<id>` of `ty`, `None` if it isn't declared
    pub fn get_id(&self, ty: &Type) -> Option<Word> {
        self.get_handle_id(self.pool.find(ty)?)
    }
    pub fn get_handle_id(&self, handle: TypeHandle) -> Option<Word> {
        self.type_to_id.get(&handle).copied()
    }
    /// the type of `id` and a new pointer type to it.
    ///
    /// the pointer type isn't registered or emitted.
    pub fn get_type_and_pointer_type(
        &self,
        id: Word,
        storage_class: StorageClass,
    ) -> Option<(TypeHandle, Type)> {
        let handle = self.get_type_handle(id)?;
        Some((handle, Pointer::new(handle, storage_class).into()))
    }
    /// the `index`-th forward pointer, counting in module order
    pub fn get_forward_pointer(&self, index: usize) -> Option<&ForwardPointer> {
        self.pool
            .get(self.forward_pointers.get(index)?)
            .as_forward_pointer()
    }
    /// the pool entry of the `index`-th forward pointer
    pub fn get_forward_pointer_handle(&self, index: usize) -> Option<TypeHandle> {
        self.forward_pointers.get(index)
    }
    /// record every type declared in `context`
    pub fn analyze_types(&mut self, context: &IrContext) {
        for instruction in &context.module().types_global_values {
            self.record_if_type_definition(context, instruction);
        }
        log::debug!(
            "analyzed {} types, {} distinct",
            self.id_to_type.len(),
            self.pool.len()
        );
    }
    /// look up the type `id` refers to while analyzing `instruction`.
    ///
    /// `id` may name a pointer type that has only been forward declared so far.
    fn operand_type(&mut self, instruction: &Instruction, index: usize) -> Option<TypeRef> {
        let id = id_operand(instruction, index);
        if let Some(handle) = self.get_type_handle(id) {
            return Some(handle.into());
        }
        if let Some(handle) = self.forward_pointers.pending_for(id) {
            return Some(handle.into());
        }
        self.report(
            MessageLevel::Error,
            format!("Op{:?}: %{} is not a type", instruction.class.opcode, id),
        );
        None
    }
    fn type_from_instruction(&mut self, instruction: &Instruction) -> Option<Type> {
        let operand_count = instruction.operands.len();
        Some(match instruction.class.opcode {
            Op::TypeVoid => TypeData::Void.into(),
            Op::TypeBool => TypeData::Bool.into(),
            Op::TypeInt => Integer {
                width: literal(instruction, 0),
                signed: literal(instruction, 1) != 0,
            }
            .into(),
            Op::TypeFloat => Float {
                width: literal(instruction, 0),
            }
            .into(),
            Op::TypeVector => Vector {
                element: self.operand_type(instruction, 0)?,
                count: literal(instruction, 1),
            }
            .into(),
            Op::TypeMatrix => Matrix {
                element: self.operand_type(instruction, 0)?,
                count: literal(instruction, 1),
            }
            .into(),
            Op::TypeImage => Image {
                sampled_type: self.operand_type(instruction, 0)?,
                dim: match instruction.operands.get(1) {
                    Some(&Operand::Dim(v)) => v,
                    _ => panic!("known to be a Dim"),
                },
                depth: literal(instruction, 2),
                arrayed: literal(instruction, 3) != 0,
                multisampled: literal(instruction, 4) != 0,
                sampled: literal(instruction, 5),
                format: match instruction.operands.get(6) {
                    Some(&Operand::ImageFormat(v)) => v,
                    _ => panic!("known to be an ImageFormat"),
                },
                access_qualifier: access_qualifier_operand(instruction, 7)
                    .unwrap_or(AccessQualifier::ReadOnly),
            }
            .into(),
            Op::TypeSampler => TypeData::Sampler.into(),
            Op::TypeSampledImage => SampledImage {
                image: self.operand_type(instruction, 0)?,
            }
            .into(),
            Op::TypeArray => Array {
                element: self.operand_type(instruction, 0)?,
                length_id: id_operand(instruction, 1),
            }
            .into(),
            Op::TypeRuntimeArray => RuntimeArray {
                element: self.operand_type(instruction, 0)?,
            }
            .into(),
            Op::TypeStruct => {
                let mut element_types = Vec::with_capacity(operand_count);
                for index in 0..operand_count {
                    element_types.push(self.operand_type(instruction, index)?);
                }
                Struct::new(element_types).into()
            }
            Op::TypeOpaque => Opaque {
                name: match instruction.operands.get(0) {
                    Some(Operand::LiteralString(v)) => v.clone(),
                    _ => panic!("known to be a string"),
                },
            }
            .into(),
            Op::TypePointer => Pointer {
                storage_class: storage_class_operand(instruction, 0),
                pointee: self.operand_type(instruction, 1)?,
            }
            .into(),
            Op::TypeFunction => {
                let return_type = self.operand_type(instruction, 0)?;
                let mut params = Vec::with_capacity(operand_count.saturating_sub(1));
                for index in 1..operand_count {
                    params.push(self.operand_type(instruction, index)?);
                }
                Function {
                    return_type,
                    params,
                }
                .into()
            }
            Op::TypeEvent => TypeData::Event.into(),
            Op::TypeDeviceEvent => TypeData::DeviceEvent.into(),
            Op::TypeReserveId => TypeData::ReserveId.into(),
            Op::TypeQueue => TypeData::Queue.into(),
            Op::TypePipe => Pipe {
                access_qualifier: access_qualifier_operand(instruction, 0)
                    .expect("known to be an AccessQualifier"),
            }
            .into(),
            Op::TypePipeStorage => TypeData::PipeStorage.into(),
            Op::TypeNamedBarrier => TypeData::NamedBarrier.into(),
            opcode => {
                self.report(
                    MessageLevel::InternalError,
                    format!("unhandled type: Op{:?}", opcode),
                );
                return None;
            }
        })
    }
    /// record the type `instruction` declares, if it declares one.
    ///
    /// returns the handle of the recorded type. every `OpTypeForwardPointer`
    /// gets its own pool entry, even when an identical one was seen before.
    pub fn record_if_type_definition(
        &mut self,
        context: &IrContext,
        instruction: &Instruction,
    ) -> Option<TypeHandle> {
        let opcode = instruction.class.opcode;
        if !is_type_opcode(opcode) {
            return None;
        }
        if opcode == Op::TypeForwardPointer {
            let target_id = id_operand(instruction, 0);
            let storage_class = storage_class_operand(instruction, 1);
            let handle = self
                .pool
                .insert_distinct(ForwardPointer::new(target_id, storage_class).into());
            let index = self.forward_pointers.record(handle, target_id);
            self.declared_forward_pointers.insert((target_id, storage_class));
            log::trace!("forward pointer #{} declares %{}", index, target_id);
            return Some(handle);
        }
        let id = instruction
            .result_id
            .expect("type declarations other than OpTypeForwardPointer have a result id");
        let mut ty = self.type_from_instruction(instruction)?;
        for decoration in context.get_decorations_for(id, true) {
            self.attach_decoration(decoration, &mut ty);
        }
        let handle = self.pool.insert(ty);
        if self.id_to_type.insert(id, handle).is_err() {
            self.report(
                MessageLevel::Error,
                format!("Op{:?}: invalid result %{}", opcode, id),
            );
            return None;
        }
        self.type_to_id.entry(handle).or_insert(id);
        if opcode == Op::TypePointer {
            if let Some(index) = self.forward_pointers.resolve_first(&self.pool, id, handle) {
                log::trace!("forward pointer #{} resolved to %{}", index, id);
            }
        }
        Some(handle)
    }
    /// add the decoration `instruction` applies to `ty`
    fn attach_decoration(&mut self, instruction: &Instruction, ty: &mut Type) {
        match instruction.class.opcode {
            Op::Decorate => ty.add_decoration(decoration_words(instruction, 2)),
            Op::MemberDecorate => {
                let index = literal(instruction, 1);
                match ty.as_struct_mut() {
                    Some(v) => v.add_member_decoration(index, decoration_words(instruction, 3)),
                    None => self.report(
                        MessageLevel::InternalError,
                        String::from("unimplemented: OpMemberDecorate on a non-struct type"),
                    ),
                }
            }
            opcode if is_annotation_opcode(opcode) => self.report(
                MessageLevel::InternalError,
                format!("unexpected decoration instruction: Op{:?}", opcode),
            ),
            _ => {}
        }
    }
    /// make sure `ty` is declared in `context`, emitting declarations for it
    /// and any of its subtypes that aren't declared yet.
    ///
    /// returns the representative `<id>` of `ty`, or `None` if there aren't
    /// enough `<id>`s left, in which case nothing is emitted or registered.
    pub fn get_type_instruction(&mut self, context: &mut IrContext, ty: &Type) -> Option<Word> {
        if let Some(id) = self.get_id(ty) {
            return Some(id);
        }
        let handle = self.rebuild_type(ty);
        self.declare(context, handle)
    }
    fn declare(&mut self, context: &mut IrContext, handle: TypeHandle) -> Option<Word> {
        let needed = self.count_undeclared(handle, &mut HashSet::new());
        if needed > context.remaining_ids() {
            let text = format!(
                "ran out of <id>s declaring {}: {} needed, {} left",
                self.pool.get(handle).display(&self.pool),
                needed,
                context.remaining_ids()
            );
            self.report(MessageLevel::Error, text);
            return None;
        }
        let id = self.materialize(context, handle);
        while !self.deferred_pointers.is_empty() {
            for (pointer_id, pointer) in mem::take(&mut self.deferred_pointers) {
                self.emit_declaration(context, pointer_id, pointer);
            }
        }
        Some(id)
    }
    /// the number of `<id>`s [`materialize`](Self::materialize) takes for `handle`
    fn count_undeclared(&self, handle: TypeHandle, seen: &mut HashSet<TypeHandle>) -> u32 {
        if self.get_handle_id(handle).is_some() || !seen.insert(handle) {
            return 0;
        }
        let ty = self.pool.get(handle);
        if let Some(forward_pointer) = ty.as_forward_pointer() {
            return forward_pointer
                .target_pointer()
                .map_or(0, |pointer| self.count_undeclared(pointer, seen));
        }
        let subtypes: u32 = ty
            .subtypes()
            .iter()
            .filter_map(|v| v.handle())
            .map(|subtype| self.count_undeclared(subtype, seen))
            .sum();
        1 + subtypes
    }
    fn take_id(context: &mut IrContext) -> Word {
        context
            .take_next_id()
            .expect("known to have enough <id>s left")
    }
    fn materialize_ref(&mut self, context: &mut IrContext, ty: &TypeRef) -> Word {
        let handle = self.rebuild_ref(ty);
        self.materialize(context, handle)
    }
    fn materialize(&mut self, context: &mut IrContext, handle: TypeHandle) -> Word {
        if let Some(id) = self.get_handle_id(handle) {
            return id;
        }
        if let Some(forward_pointer) = self.pool.get(handle).as_forward_pointer() {
            let storage_class = forward_pointer.storage_class();
            let target_id = forward_pointer.target_id();
            return match forward_pointer.target_pointer() {
                Some(pointer) => self.forward_declare(context, pointer, storage_class),
                None => {
                    self.emit_forward_pointer(context, target_id, storage_class);
                    target_id
                }
            };
        }
        let id = Self::take_id(context);
        // registered before the subtypes so cycles terminate
        self.register_handle(id, handle);
        self.emit_declaration(context, id, handle);
        id
    }
    /// the `<id>` of `pointer`, declaring it with `OpTypeForwardPointer` if
    /// it has none yet; its `OpTypePointer` follows once the type being
    /// declared is done
    fn forward_declare(
        &mut self,
        context: &mut IrContext,
        pointer: TypeHandle,
        storage_class: StorageClass,
    ) -> Word {
        if let Some(id) = self.get_handle_id(pointer) {
            return id;
        }
        let id = Self::take_id(context);
        self.register_handle(id, pointer);
        self.emit_forward_pointer(context, id, storage_class);
        self.deferred_pointers.push((id, pointer));
        id
    }
    fn emit_forward_pointer(
        &mut self,
        context: &mut IrContext,
        target_id: Word,
        storage_class: StorageClass,
    ) {
        if !self.declared_forward_pointers.insert((target_id, storage_class)) {
            return;
        }
        let location = context.add_type(Instruction::new(
            Op::TypeForwardPointer,
            None,
            None,
            vec![
                Operand::IdRef(target_id),
                Operand::StorageClass(storage_class),
            ],
        ));
        context.analyze_def_use(location);
    }
    /// emit the instruction declaring `handle` as `id`, after declaring its subtypes
    fn emit_declaration(&mut self, context: &mut IrContext, id: Word, handle: TypeHandle) {
        let ty = self.pool.get(handle).clone();
        let (opcode, operands) = match ty.data() {
            TypeData::Void => (Op::TypeVoid, vec![]),
            TypeData::Bool => (Op::TypeBool, vec![]),
            TypeData::Integer(v) => (
                Op::TypeInt,
                vec![
                    Operand::LiteralBit32(v.width),
                    Operand::LiteralBit32(u32::from(v.signed)),
                ],
            ),
            TypeData::Float(v) => (Op::TypeFloat, vec![Operand::LiteralBit32(v.width)]),
            TypeData::Vector(v) => (
                Op::TypeVector,
                vec![
                    Operand::IdRef(self.materialize_ref(context, &v.element)),
                    Operand::LiteralBit32(v.count),
                ],
            ),
            TypeData::Matrix(v) => (
                Op::TypeMatrix,
                vec![
                    Operand::IdRef(self.materialize_ref(context, &v.element)),
                    Operand::LiteralBit32(v.count),
                ],
            ),
            TypeData::Image(v) => (
                Op::TypeImage,
                vec![
                    Operand::IdRef(self.materialize_ref(context, &v.sampled_type)),
                    Operand::Dim(v.dim),
                    Operand::LiteralBit32(v.depth),
                    Operand::LiteralBit32(u32::from(v.arrayed)),
                    Operand::LiteralBit32(u32::from(v.multisampled)),
                    Operand::LiteralBit32(v.sampled),
                    Operand::ImageFormat(v.format),
                    Operand::AccessQualifier(v.access_qualifier),
                ],
            ),
            TypeData::Sampler => (Op::TypeSampler, vec![]),
            TypeData::SampledImage(v) => (
                Op::TypeSampledImage,
                vec![Operand::IdRef(self.materialize_ref(context, &v.image))],
            ),
            TypeData::Array(v) => (
                Op::TypeArray,
                vec![
                    Operand::IdRef(self.materialize_ref(context, &v.element)),
                    Operand::IdRef(v.length_id),
                ],
            ),
            TypeData::RuntimeArray(v) => (
                Op::TypeRuntimeArray,
                vec![Operand::IdRef(self.materialize_ref(context, &v.element))],
            ),
            TypeData::Struct(v) => {
                let mut operands = Vec::with_capacity(v.element_types.len());
                for element in &v.element_types {
                    operands.push(Operand::IdRef(self.materialize_ref(context, element)));
                }
                (Op::TypeStruct, operands)
            }
            TypeData::Opaque(v) => (Op::TypeOpaque, vec![Operand::LiteralString(v.name.clone())]),
            TypeData::Pointer(v) => (
                Op::TypePointer,
                vec![
                    Operand::StorageClass(v.storage_class),
                    Operand::IdRef(self.materialize_ref(context, &v.pointee)),
                ],
            ),
            TypeData::Function(v) => {
                let mut operands = Vec::with_capacity(v.params.len() + 1);
                operands.push(Operand::IdRef(
                    self.materialize_ref(context, &v.return_type),
                ));
                for param in &v.params {
                    operands.push(Operand::IdRef(self.materialize_ref(context, param)));
                }
                (Op::TypeFunction, operands)
            }
            TypeData::Event => (Op::TypeEvent, vec![]),
            TypeData::DeviceEvent => (Op::TypeDeviceEvent, vec![]),
            TypeData::ReserveId => (Op::TypeReserveId, vec![]),
            TypeData::Queue => (Op::TypeQueue, vec![]),
            TypeData::Pipe(v) => (
                Op::TypePipe,
                vec![Operand::AccessQualifier(v.access_qualifier)],
            ),
            TypeData::PipeStorage => (Op::TypePipeStorage, vec![]),
            TypeData::NamedBarrier => (Op::TypeNamedBarrier, vec![]),
            TypeData::ForwardPointer(_) => unreachable!("forward pointers have no <id>"),
        };
        let location = context.add_type(Instruction::new(opcode, None, Some(id), operands));
        context.analyze_def_use(location);
        self.attach_decorations(context, id, &ty);
        log::trace!("declared {} as %{}", ty.display(&self.pool), id);
    }
    /// emit the decorations of `ty`, including its member decorations, targeting `id`
    fn attach_decorations(&mut self, context: &mut IrContext, id: Word, ty: &Type) {
        for decoration in ty.decorations() {
            self.create_decoration(context, id, decoration, None);
        }
        if let Some(v) = ty.as_struct() {
            for (&member, decorations) in v.element_decorations() {
                for decoration in decorations {
                    self.create_decoration(context, id, decoration, Some(member));
                }
            }
        }
    }
    fn create_decoration(
        &mut self,
        context: &mut IrContext,
        target: Word,
        decoration: &[u32],
        member: Option<u32>,
    ) {
        let (&kind, parameters) = match decoration.split_first() {
            Some(v) => v,
            None => {
                self.report(
                    MessageLevel::InternalError,
                    format!("empty decoration on %{}", target),
                );
                return;
            }
        };
        let kind = Decoration::from_u32(kind).ok_or(kind);
        let mut operands = Vec::with_capacity(decoration.len() + 2);
        operands.push(Operand::IdRef(target));
        operands.extend(member.map(Operand::LiteralBit32));
        operands.push(match kind {
            Ok(kind) => Operand::Decoration(kind),
            Err(kind) => Operand::LiteralBit32(kind),
        });
        operands.extend(
            parameters
                .iter()
                .map(|&word| decoration_parameter(kind.ok(), word)),
        );
        let opcode = if member.is_some() {
            Op::MemberDecorate
        } else {
            Op::Decorate
        };
        context.add_annotation_inst(Instruction::new(opcode, None, None, operands));
    }
    /// find or declare a pointer to the type declared by `pointee_id`.
    ///
    /// an existing `OpTypePointer` naming exactly `pointee_id` is reused even
    /// when `pointee_id` isn't the representative `<id>` of its type.
    ///
    /// # Panics
    ///
    /// panics if `pointee_id` doesn't declare a type
    pub fn find_pointer_to_type(
        &mut self,
        context: &mut IrContext,
        pointee_id: Word,
        storage_class: StorageClass,
    ) -> Option<Word> {
        let (pointee, pointer) = match self.get_type_and_pointer_type(pointee_id, storage_class) {
            Some(v) => v,
            None => panic!("%{} is not a type", pointee_id),
        };
        if self.get_handle_id(pointee) == Some(pointee_id) {
            return self.get_type_instruction(context, &pointer);
        }
        for instruction in &context.module().types_global_values {
            if instruction.class.opcode == Op::TypePointer
                && id_in_operand(instruction, 1) == Some(pointee_id)
                && instruction.operands.get(0) == Some(&Operand::StorageClass(storage_class))
            {
                return instruction.result_id;
            }
        }
        let id = match context.take_next_id() {
            Some(id) => id,
            None => {
                self.report(
                    MessageLevel::Error,
                    String::from("ran out of <id>s declaring a pointer type"),
                );
                return None;
            }
        };
        let location = context.add_type(Instruction::new(
            Op::TypePointer,
            None,
            Some(id),
            vec![
                Operand::StorageClass(storage_class),
                Operand::IdRef(pointee_id),
            ],
        ));
        context.analyze_def_use(location);
        self.register_type(id, &pointer);
        Some(id)
    }
    fn register_handle(&mut self, id: Word, handle: TypeHandle) {
        self.id_to_type
            .insert(id, handle)
            .expect("<id> 0 is never valid");
        self.type_to_id.entry(handle).or_insert(id);
    }
    /// record that `id` declares `ty` without emitting anything.
    ///
    /// `id` only becomes the representative `<id>` if `ty` didn't have one yet.
    pub fn register_type(&mut self, id: Word, ty: &Type) -> TypeHandle {
        let handle = self.rebuild_type(ty);
        self.register_handle(id, handle);
        handle
    }
    /// forget that `id` declares a type.
    ///
    /// if `id` was the representative `<id>` of a type SPIR-V allows several
    /// declarations of, another `<id>` declaring it takes over.
    pub fn remove_id(&mut self, id: Word) {
        let handle = match self.get_type_handle(id) {
            Some(handle) => handle,
            None => return,
        };
        if self.pool.get(handle).is_unique_type(true) {
            self.type_to_id.remove(&handle);
        } else if self.get_handle_id(handle) == Some(id) {
            let pool = &self.pool;
            let ty = pool.get(handle);
            let replacement = self
                .id_to_type
                .iter()
                .find(|&(other_id, &other)| {
                    other_id != id && (other == handle || pool.get(other).is_same(ty, pool))
                })
                .map(|(other_id, _)| other_id);
            match replacement {
                Some(other_id) => {
                    log::trace!("%{} takes over from %{}", other_id, id);
                    self.type_to_id.insert(handle, other_id);
                }
                None => {
                    self.type_to_id.remove(&handle);
                }
            }
        }
        let _ = self.id_to_type.remove(id);
    }
    /// make sure `ty` is declared in `context`, returning the pooled copy
    pub fn get_registered_type(
        &mut self,
        context: &mut IrContext,
        ty: &Type,
    ) -> Option<TypeHandle> {
        let id = self.get_type_instruction(context, ty)?;
        self.get_type_handle(id)
    }
    /// walk `indices` down from `parent` through struct members and the
    /// elements of arrays, vectors, and matrices.
    ///
    /// # Panics
    ///
    /// panics if an index is applied to a type without members, or a struct
    /// index is out of range
    pub fn get_member_type<'a>(&'a self, parent: &'a Type, indices: &[u32]) -> &'a Type {
        let mut ty = parent;
        for &index in indices {
            let element = match ty.data() {
                TypeData::Struct(v) => &v.element_types[index as usize],
                TypeData::Array(v) => &v.element,
                TypeData::RuntimeArray(v) => &v.element,
                TypeData::Vector(v) => &v.element,
                TypeData::Matrix(v) => &v.element,
                _ => panic!(
                    "trying to get the member of a type without members: {}",
                    ty.display(&self.pool)
                ),
            };
            ty = element.resolve(&self.pool);
        }
        ty
    }
    fn rebuild_ref(&mut self, ty: &TypeRef) -> TypeHandle {
        match ty {
            TypeRef::Pooled(handle) => *handle,
            TypeRef::Owned(ty) => self.rebuild_type(ty),
        }
    }
    /// pool `ty` and every subtype it owns
    pub(crate) fn rebuild_type(&mut self, ty: &Type) -> TypeHandle {
        let rebuilt = ty.try_map_subtypes(|v| Ok::<_, Infallible>(self.rebuild_ref(v).into()));
        let rebuilt = match rebuilt {
            Ok(v) => v,
            Err(v) => match v {},
        };
        self.pool.insert(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spirv_ir::{assemble, Disassemble};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn context(text: &str) -> IrContext {
        IrContext::new(assemble(text).unwrap())
    }

    fn collecting_manager(context: &IrContext) -> (TypeManager, Rc<RefCell<Vec<Message>>>) {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let consumer_messages = messages.clone();
        let manager = TypeManager::with_message_consumer(
            context,
            Box::new(move |message: &Message| {
                consumer_messages.borrow_mut().push(message.clone())
            }),
        );
        (manager, messages)
    }

    fn types_text(context: &IrContext) -> Vec<String> {
        context
            .module()
            .types_global_values
            .iter()
            .map(Disassemble::disassemble)
            .collect()
    }

    #[test]
    fn test_analyze() {
        let context = context(
            "
               OpDecorate %3 ArrayStride 16
          %1 = OpTypeFloat 32
          %2 = OpTypeVector %1 4
          %3 = OpTypeRuntimeArray %2
          %4 = OpTypeImage %1 2D 0 0 0 1 Unknown
          %5 = OpTypeImage %1 2D 0 0 0 1 Unknown ReadOnly
          %6 = OpTypeFunction %1 %2 %1
",
        );
        let (manager, messages) = collecting_manager(&context);
        assert!(messages.borrow().is_empty());
        let vector = manager.get_type(2).unwrap().as_vector().unwrap();
        assert_eq!(vector.count, 4);
        assert_eq!(vector.element.handle(), manager.get_type_handle(1));
        let array = manager.get_type(3).unwrap();
        assert_eq!(array.decorations(), [vec![Decoration::ArrayStride as u32, 16]]);
        // the access qualifier defaults to ReadOnly
        assert_eq!(manager.get_type_handle(4), manager.get_type_handle(5));
        let image = manager.get_type_handle(5).unwrap();
        assert_eq!(manager.get_handle_id(image), Some(4));
        let function = manager.get_type(6).unwrap().as_function().unwrap();
        assert_eq!(function.params.len(), 2);
        assert_eq!(manager.get_type(7).map(Type::kind), None);
    }

    #[test]
    fn test_diagnostics() {
        let context = context(
            "
               OpMemberDecorate %1 0 Offset 0
          %1 = OpTypeFloat 32
          %2 = OpTypeVector %9 4
          %3 = OpTypeRayQueryKHR
",
        );
        let (manager, messages) = collecting_manager(&context);
        let levels: Vec<_> = messages.borrow().iter().map(|v| v.level).collect();
        assert_eq!(
            levels,
            [
                MessageLevel::InternalError,
                MessageLevel::Error,
                MessageLevel::InternalError
            ]
        );
        assert!(manager.get_type(1).is_some());
        assert!(manager.get_type(2).is_none());
        assert!(manager.get_type(3).is_none());
    }

    #[test]
    fn test_get_type_and_pointer_type() {
        let context = context("%1 = OpTypeBool");
        let manager = TypeManager::new(&context);
        let (handle, pointer) = manager
            .get_type_and_pointer_type(1, StorageClass::Private)
            .unwrap();
        assert_eq!(Some(handle), manager.get_type_handle(1));
        let pointer = pointer.as_pointer().unwrap();
        assert_eq!(pointer.storage_class, StorageClass::Private);
        assert_eq!(pointer.pointee.handle(), Some(handle));
        let candidate = Pointer::new(handle, StorageClass::Private).into();
        assert_eq!(manager.get_id(&candidate), None);
        assert!(manager
            .get_type_and_pointer_type(2, StorageClass::Private)
            .is_none());
    }

    #[test]
    fn test_rebuild_type() {
        let context = context("");
        let mut manager = TypeManager::new(&context);
        let float: Type = Float { width: 32 }.into();
        let matrix: Type = Matrix {
            element: Type::from(Vector {
                element: float.clone().into(),
                count: 3,
            })
            .into(),
            count: 3,
        }
        .into();
        let handle = manager.rebuild_type(&matrix);
        assert_eq!(manager.pool().len(), 3);
        assert_eq!(manager.rebuild_type(&matrix), handle);
        assert!(manager.pool().get(handle).is_same(&matrix, manager.pool()));
        assert_eq!(manager.get_id(&matrix), None);
        let column = manager.get_member_type(&matrix, &[0]);
        assert!(column.as_vector().is_some());
        let element = manager.get_member_type(manager.pool().get(handle), &[2, 1]);
        assert!(element.is_same(&float, manager.pool()));
    }

    #[test]
    #[should_panic]
    fn test_get_member_type_of_scalar() {
        let context = context("");
        let manager = TypeManager::new(&context);
        manager.get_member_type(&Float { width: 32 }.into(), &[0]);
    }

    #[test]
    fn test_id_overflow() {
        let module = assemble("%1 = OpTypeFloat 32").unwrap();
        let mut context = IrContext::with_max_id_bound(module, 3);
        let (mut manager, messages) = collecting_manager(&context);
        let float: Type = Float { width: 32 }.into();
        let vector: Type = Vector {
            element: float.clone().into(),
            count: 2,
        }
        .into();
        let vector_id = manager.get_type_instruction(&mut context, &vector);
        assert_eq!(vector_id, Some(2));
        let pointer: Type = Pointer::new(vector, StorageClass::Function).into();
        assert_eq!(manager.get_type_instruction(&mut context, &pointer), None);
        assert_eq!(messages.borrow().len(), 1);
        assert_eq!(messages.borrow()[0].level, MessageLevel::Error);
        assert_eq!(manager.get_id(&pointer), None);
        assert_eq!(context.module().types_global_values.len(), 2);
    }

    #[test]
    fn test_id_overflow_inside_nested_type() {
        // one <id> left, the struct needs two: itself and its member
        let module = assemble("").unwrap();
        let mut context = IrContext::with_max_id_bound(module, 2);
        let (mut manager, messages) = collecting_manager(&context);
        let float: Type = Float { width: 32 }.into();
        let node: Type = Struct::new(vec![float.clone().into()]).into();
        assert_eq!(manager.get_type_instruction(&mut context, &node), None);
        assert_eq!(manager.get_type(1).map(Type::kind), None);
        assert_eq!(manager.get_id(&node), None);
        assert_eq!(manager.get_id(&float), None);
        // a second attempt must not find a half-declared struct
        assert_eq!(manager.get_type_instruction(&mut context, &node), None);
        assert!(context.module().types_global_values.is_empty());
        assert_eq!(context.remaining_ids(), 1);
        assert_eq!(messages.borrow().len(), 2);
        assert_eq!(manager.get_type_instruction(&mut context, &float), Some(1));
        assert_eq!(types_text(&context), ["%1 = OpTypeFloat 32"]);
    }

    #[test]
    fn test_forward_pointer_after_target_removed() {
        let mut context = context(
            "
               OpTypeForwardPointer %3 StorageBuffer
          %1 = OpTypeInt 32 0
          %2 = OpTypeStruct %1 %3
          %3 = OpTypePointer StorageBuffer %2
",
        );
        let mut manager = TypeManager::new(&context);
        let node = manager.get_type(2).unwrap().clone();
        let forward_pointer = manager.get_forward_pointer_handle(0).unwrap();
        assert_eq!(node.as_struct().unwrap().element_types[1].handle(), Some(forward_pointer));
        assert_eq!(manager.get_handle_id(forward_pointer), None);
        manager.remove_id(3);
        manager.remove_id(2);
        assert_eq!(manager.get_id(&node), None);
        assert_eq!(manager.get_type_instruction(&mut context, &node), Some(4));
        assert_eq!(
            types_text(&context)[4..],
            [
                "OpTypeForwardPointer %5 StorageBuffer",
                "%4 = OpTypeStruct %1 %5",
                "%5 = OpTypePointer StorageBuffer %4",
            ]
        );
        assert_eq!(manager.get_handle_id(forward_pointer), None);
        let pointer = manager.get_type(5).unwrap();
        assert_eq!(pointer.as_pointer().unwrap().pointee.handle(), manager.get_type_handle(4));
    }

    #[test]
    fn test_unresolved_forward_pointer_declared_once() {
        let mut context = context("OpTypeForwardPointer %7 PhysicalStorageBuffer");
        let mut manager = TypeManager::new(&context);
        let candidate: Type = ForwardPointer::new(7, StorageClass::PhysicalStorageBuffer).into();
        assert_eq!(manager.get_type_instruction(&mut context, &candidate), Some(7));
        let other: Type = ForwardPointer::new(9, StorageClass::PhysicalStorageBuffer).into();
        assert_eq!(manager.get_type_instruction(&mut context, &other), Some(9));
        assert_eq!(manager.get_type_instruction(&mut context, &other), Some(9));
        assert_eq!(
            types_text(&context),
            [
                "OpTypeForwardPointer %7 PhysicalStorageBuffer",
                "OpTypeForwardPointer %9 PhysicalStorageBuffer",
            ]
        );
        assert_eq!(manager.get_type(7).map(Type::kind), None);
    }
}
