// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

//! the SPIR-V type hierarchy

use crate::pool::{TypeHandle, TypePool};
use hashbrown::HashSet;
use once_cell::unsync::OnceCell;
use spirv_ir::{AccessQualifier, Decoration, Dim, ImageFormat, StorageClass, Word};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// a decoration: the `Decoration` enumerant followed by its literal operands
pub type DecorationRecord = Vec<u32>;

/// a reference from a type to one of its subtypes
#[derive(Clone, Debug)]
pub enum TypeRef {
    /// a canonical type owned by a `TypePool`
    Pooled(TypeHandle),
    /// a type that isn't in any pool, part of a candidate being built up
    Owned(Box<Type>),
}

impl TypeRef {
    /// get the referenced type
    pub fn resolve<'a>(&'a self, pool: &'a TypePool) -> &'a Type {
        match self {
            TypeRef::Pooled(handle) => pool.get(*handle),
            TypeRef::Owned(ty) => ty,
        }
    }
    /// the handle if `self` refers to a pool entry
    pub fn handle(&self) -> Option<TypeHandle> {
        match *self {
            TypeRef::Pooled(handle) => Some(handle),
            TypeRef::Owned(_) => None,
        }
    }
}

impl From<TypeHandle> for TypeRef {
    fn from(v: TypeHandle) -> Self {
        TypeRef::Pooled(v)
    }
}

impl From<Type> for TypeRef {
    fn from(v: Type) -> Self {
        TypeRef::Owned(Box::new(v))
    }
}

/// only consistent with `Type::is_same` when every `TypeRef` reachable
/// through `Owned` references is `Pooled`, which holds for rebuilt types
impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            TypeRef::Pooled(handle) => handle.hash(state),
            TypeRef::Owned(ty) => ty.hash(state),
        }
    }
}

/// `OpTypeInt`
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Integer {
    /// width in bits
    pub width: u32,
    pub signed: bool,
}

/// `OpTypeFloat`
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Float {
    /// width in bits
    pub width: u32,
}

/// `OpTypeVector`
#[derive(Clone, Hash, Debug)]
pub struct Vector {
    pub element: TypeRef,
    pub count: u32,
}

/// `OpTypeMatrix`
#[derive(Clone, Hash, Debug)]
pub struct Matrix {
    /// the column type
    pub element: TypeRef,
    /// the number of columns
    pub count: u32,
}

/// `OpTypeImage`
#[derive(Clone, Hash, Debug)]
pub struct Image {
    pub sampled_type: TypeRef,
    pub dim: Dim,
    /// 0 for not a depth image, 1 for a depth image, 2 for unknown
    pub depth: u32,
    pub arrayed: bool,
    pub multisampled: bool,
    /// 0 for unknown, 1 for use with a sampler, 2 for storage images
    pub sampled: u32,
    pub format: ImageFormat,
    pub access_qualifier: AccessQualifier,
}

/// `OpTypeSampledImage`
#[derive(Clone, Hash, Debug)]
pub struct SampledImage {
    pub image: TypeRef,
}

/// `OpTypeArray`
#[derive(Clone, Hash, Debug)]
pub struct Array {
    pub element: TypeRef,
    /// the `<id>` of the constant holding the length
    pub length_id: Word,
}

/// `OpTypeRuntimeArray`
#[derive(Clone, Hash, Debug)]
pub struct RuntimeArray {
    pub element: TypeRef,
}

/// `OpTypeStruct`
#[derive(Clone, Debug)]
pub struct Struct {
    pub element_types: Vec<TypeRef>,
    element_decorations: BTreeMap<u32, Vec<DecorationRecord>>,
}

impl Struct {
    pub fn new(element_types: Vec<TypeRef>) -> Self {
        Self {
            element_types,
            element_decorations: BTreeMap::new(),
        }
    }
    /// the decorations on each member, keyed by member index
    pub fn element_decorations(&self) -> &BTreeMap<u32, Vec<DecorationRecord>> {
        &self.element_decorations
    }
    pub fn add_member_decoration(&mut self, index: u32, decoration: DecorationRecord) {
        self.element_decorations
            .entry(index)
            .or_insert_with(Vec::new)
            .push(decoration);
    }
}

impl Hash for Struct {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element_types.hash(state);
        state.write_usize(self.element_decorations.len());
        for (index, decorations) in &self.element_decorations {
            index.hash(state);
            hash_decorations(decorations, state);
        }
    }
}

/// `OpTypeOpaque`
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Opaque {
    pub name: String,
}

/// `OpTypePointer`
#[derive(Clone, Hash, Debug)]
pub struct Pointer {
    pub storage_class: StorageClass,
    pub pointee: TypeRef,
}

impl Pointer {
    pub fn new<T: Into<TypeRef>>(pointee: T, storage_class: StorageClass) -> Self {
        Self {
            storage_class,
            pointee: pointee.into(),
        }
    }
}

/// `OpTypeFunction`
#[derive(Clone, Hash, Debug)]
pub struct Function {
    pub return_type: TypeRef,
    pub params: Vec<TypeRef>,
}

/// `OpTypePipe`
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Pipe {
    pub access_qualifier: AccessQualifier,
}

/// `OpTypeForwardPointer`: a pointer declared before the `OpTypePointer`
/// defining it.
///
/// the target pointer is a non-owning link to the pool entry of the pointer
/// type, set at most once when that pointer is recorded.
#[derive(Clone, Debug)]
pub struct ForwardPointer {
    target_id: Word,
    storage_class: StorageClass,
    target_pointer: OnceCell<TypeHandle>,
}

impl ForwardPointer {
    pub fn new(target_id: Word, storage_class: StorageClass) -> Self {
        Self {
            target_id,
            storage_class,
            target_pointer: OnceCell::new(),
        }
    }
    /// the result `<id>` of the `OpTypePointer` this declares
    pub fn target_id(&self) -> Word {
        self.target_id
    }
    pub fn storage_class(&self) -> StorageClass {
        self.storage_class
    }
    /// the resolved pointer type, `None` while unresolved
    pub fn target_pointer(&self) -> Option<TypeHandle> {
        self.target_pointer.get().copied()
    }
    /// link `self` to its pointer type; returns `false` if `self` was already resolved
    pub fn set_target_pointer(&self, pointer: TypeHandle) -> bool {
        self.target_pointer.set(pointer).is_ok()
    }
}

/// the target pointer is left out so resolving a pooled forward pointer
/// doesn't change its hash
impl Hash for ForwardPointer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.storage_class.hash(state);
    }
}

macro_rules! impl_type_data {
    (
        $(#[doc = $doc:expr])*
        pub enum TypeData {
            $(
                $(#[doc = $variant_doc:expr])*
                $kind:ident $(($payload:ident))?,
            )+
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Hash, Debug)]
        pub enum TypeData {
            $(
                $(#[doc = $variant_doc])*
                $kind $(($payload))?,
            )+
        }

        /// the kind of a type, without its payload
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        pub enum TypeKind {
            $(
                $(#[doc = $variant_doc])*
                $kind,
            )+
        }

        impl TypeData {
            pub fn kind(&self) -> TypeKind {
                match self {
                    $(
                        TypeData::$kind { .. } => TypeKind::$kind,
                    )+
                }
            }
        }
    };
}

impl_type_data! {
    /// the kind-specific part of a type
    pub enum TypeData {
        Void,
        Bool,
        Integer(Integer),
        Float(Float),
        Vector(Vector),
        Matrix(Matrix),
        Image(Image),
        Sampler,
        SampledImage(SampledImage),
        Array(Array),
        RuntimeArray(RuntimeArray),
        Struct(Struct),
        Opaque(Opaque),
        Pointer(Pointer),
        Function(Function),
        Event,
        DeviceEvent,
        ReserveId,
        Queue,
        Pipe(Pipe),
        ForwardPointer(ForwardPointer),
        PipeStorage,
        NamedBarrier,
    }
}

macro_rules! impl_payloads {
    ($($kind:ident => $as_fn:ident,)+) => {
        $(
            impl From<$kind> for TypeData {
                fn from(v: $kind) -> Self {
                    TypeData::$kind(v)
                }
            }

            impl From<$kind> for Type {
                fn from(v: $kind) -> Self {
                    Type::new(v)
                }
            }
        )+

        impl Type {
            $(
                /// down-cast, `None` if `self` is another kind
                pub fn $as_fn(&self) -> Option<&$kind> {
                    match &self.data {
                        TypeData::$kind(v) => Some(v),
                        _ => None,
                    }
                }
            )+
        }
    };
}

impl_payloads! {
    Integer => as_integer,
    Float => as_float,
    Vector => as_vector,
    Matrix => as_matrix,
    Image => as_image,
    SampledImage => as_sampled_image,
    Array => as_array,
    RuntimeArray => as_runtime_array,
    Struct => as_struct,
    Opaque => as_opaque,
    Pointer => as_pointer,
    Function => as_function,
    Pipe => as_pipe,
    ForwardPointer => as_forward_pointer,
}

/// a SPIR-V type: its decorations together with the kind-specific payload
#[derive(Clone, Debug)]
pub struct Type {
    decorations: Vec<DecorationRecord>,
    data: TypeData,
}

impl From<TypeData> for Type {
    fn from(data: TypeData) -> Self {
        Self {
            decorations: Vec::new(),
            data,
        }
    }
}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
        hash_decorations(&self.decorations, state);
    }
}

impl Type {
    pub fn new<T: Into<TypeData>>(data: T) -> Self {
        Self {
            decorations: Vec::new(),
            data: data.into(),
        }
    }
    pub fn kind(&self) -> TypeKind {
        self.data.kind()
    }
    pub fn data(&self) -> &TypeData {
        &self.data
    }
    pub fn decorations(&self) -> &[DecorationRecord] {
        &self.decorations
    }
    pub fn add_decoration(&mut self, decoration: DecorationRecord) {
        self.decorations.push(decoration);
    }
    /// builder form of `add_decoration`
    pub fn with_decoration(mut self, decoration: DecorationRecord) -> Self {
        self.add_decoration(decoration);
        self
    }
    pub fn as_struct_mut(&mut self) -> Option<&mut Struct> {
        match &mut self.data {
            TypeData::Struct(v) => Some(v),
            _ => None,
        }
    }
    /// `false` for the kinds SPIR-V allows several structurally identical
    /// declarations of.
    ///
    /// pointers are only ambiguous when `allow_variable_pointers` is set.
    pub fn is_unique_type(&self, allow_variable_pointers: bool) -> bool {
        match self.data {
            TypeData::Pointer(_) => !allow_variable_pointers,
            TypeData::Struct(_) | TypeData::Array(_) | TypeData::RuntimeArray(_) => false,
            _ => true,
        }
    }
    /// structural equality, independent of any `<id>`s.
    ///
    /// decoration lists compare as multisets: the order of the words in a
    /// decoration matters, the order of the decorations doesn't.
    pub fn is_same(&self, other: &Type, pool: &TypePool) -> bool {
        IsSameState {
            pool,
            seen: HashSet::new(),
        }
        .types(self, other)
    }
    /// copy `self`, replacing each direct subtype reference with the result of `f`
    pub(crate) fn try_map_subtypes<E, F: FnMut(&TypeRef) -> Result<TypeRef, E>>(
        &self,
        mut f: F,
    ) -> Result<Type, E> {
        let data = match &self.data {
            TypeData::Vector(v) => Vector {
                element: f(&v.element)?,
                count: v.count,
            }
            .into(),
            TypeData::Matrix(v) => Matrix {
                element: f(&v.element)?,
                count: v.count,
            }
            .into(),
            TypeData::Image(v) => Image {
                sampled_type: f(&v.sampled_type)?,
                ..v.clone()
            }
            .into(),
            TypeData::SampledImage(v) => SampledImage {
                image: f(&v.image)?,
            }
            .into(),
            TypeData::Array(v) => Array {
                element: f(&v.element)?,
                length_id: v.length_id,
            }
            .into(),
            TypeData::RuntimeArray(v) => RuntimeArray {
                element: f(&v.element)?,
            }
            .into(),
            TypeData::Struct(v) => Struct {
                element_types: v.element_types.iter().map(&mut f).collect::<Result<_, _>>()?,
                element_decorations: v.element_decorations.clone(),
            }
            .into(),
            TypeData::Pointer(v) => Pointer {
                storage_class: v.storage_class,
                pointee: f(&v.pointee)?,
            }
            .into(),
            TypeData::Function(v) => Function {
                return_type: f(&v.return_type)?,
                params: v.params.iter().map(&mut f).collect::<Result<_, _>>()?,
            }
            .into(),
            data => data.clone(),
        };
        Ok(Type {
            decorations: self.decorations.clone(),
            data,
        })
    }
    /// the direct subtype references, in operand order
    pub(crate) fn subtypes(&self) -> Vec<&TypeRef> {
        match &self.data {
            TypeData::Vector(v) => vec![&v.element],
            TypeData::Matrix(v) => vec![&v.element],
            TypeData::Image(v) => vec![&v.sampled_type],
            TypeData::SampledImage(v) => vec![&v.image],
            TypeData::Array(v) => vec![&v.element],
            TypeData::RuntimeArray(v) => vec![&v.element],
            TypeData::Struct(v) => v.element_types.iter().collect(),
            TypeData::Pointer(v) => vec![&v.pointee],
            TypeData::Function(v) => std::iter::once(&v.return_type).chain(&v.params).collect(),
            _ => Vec::new(),
        }
    }
    /// `true` if every subtype reference is `Pooled`
    pub(crate) fn is_rebuilt(&self) -> bool {
        self.subtypes().iter().all(|v| v.handle().is_some())
    }
    /// display `self` in a human-readable form, for diagnostics
    pub fn display<'a>(&'a self, pool: &'a TypePool) -> impl fmt::Display + 'a {
        TypeDisplay { ty: self, pool }
    }
}

fn sorted_decorations(decorations: &[DecorationRecord]) -> Vec<&DecorationRecord> {
    let mut retval: Vec<_> = decorations.iter().collect();
    retval.sort();
    retval
}

fn hash_decorations<H: Hasher>(decorations: &[DecorationRecord], state: &mut H) {
    sorted_decorations(decorations).hash(state);
}

fn same_decorations(a: &[DecorationRecord], b: &[DecorationRecord]) -> bool {
    a.len() == b.len() && sorted_decorations(a) == sorted_decorations(b)
}

struct IsSameState<'a> {
    pool: &'a TypePool,
    /// pairs of pointer payloads already being compared
    seen: HashSet<(usize, usize)>,
}

impl IsSameState<'_> {
    fn refs(&mut self, a: &TypeRef, b: &TypeRef) -> bool {
        if let (Some(a), Some(b)) = (a.handle(), b.handle()) {
            if a == b {
                return true;
            }
        }
        let pool = self.pool;
        self.types(a.resolve(pool), b.resolve(pool))
    }
    fn ref_lists(&mut self, a: &[TypeRef], b: &[TypeRef]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(a, b)| self.refs(a, b))
    }
    fn types(&mut self, a: &Type, b: &Type) -> bool {
        if !same_decorations(&a.decorations, &b.decorations) {
            return false;
        }
        match (&a.data, &b.data) {
            (TypeData::Void, TypeData::Void)
            | (TypeData::Bool, TypeData::Bool)
            | (TypeData::Sampler, TypeData::Sampler)
            | (TypeData::Event, TypeData::Event)
            | (TypeData::DeviceEvent, TypeData::DeviceEvent)
            | (TypeData::ReserveId, TypeData::ReserveId)
            | (TypeData::Queue, TypeData::Queue)
            | (TypeData::PipeStorage, TypeData::PipeStorage)
            | (TypeData::NamedBarrier, TypeData::NamedBarrier) => true,
            (TypeData::Integer(a), TypeData::Integer(b)) => a == b,
            (TypeData::Float(a), TypeData::Float(b)) => a == b,
            (TypeData::Vector(a), TypeData::Vector(b)) => {
                a.count == b.count && self.refs(&a.element, &b.element)
            }
            (TypeData::Matrix(a), TypeData::Matrix(b)) => {
                a.count == b.count && self.refs(&a.element, &b.element)
            }
            (TypeData::Image(a), TypeData::Image(b)) => {
                a.dim == b.dim
                    && a.depth == b.depth
                    && a.arrayed == b.arrayed
                    && a.multisampled == b.multisampled
                    && a.sampled == b.sampled
                    && a.format == b.format
                    && a.access_qualifier == b.access_qualifier
                    && self.refs(&a.sampled_type, &b.sampled_type)
            }
            (TypeData::SampledImage(a), TypeData::SampledImage(b)) => {
                self.refs(&a.image, &b.image)
            }
            (TypeData::Array(a), TypeData::Array(b)) => {
                a.length_id == b.length_id && self.refs(&a.element, &b.element)
            }
            (TypeData::RuntimeArray(a), TypeData::RuntimeArray(b)) => {
                self.refs(&a.element, &b.element)
            }
            (TypeData::Struct(a), TypeData::Struct(b)) => {
                a.element_decorations.len() == b.element_decorations.len()
                    && a
                        .element_decorations
                        .iter()
                        .zip(&b.element_decorations)
                        .all(|((a_index, a), (b_index, b))| {
                            a_index == b_index && same_decorations(a, b)
                        })
                    && self.ref_lists(&a.element_types, &b.element_types)
            }
            (TypeData::Opaque(a), TypeData::Opaque(b)) => a == b,
            (TypeData::Pointer(a), TypeData::Pointer(b)) => {
                if a.storage_class != b.storage_class {
                    return false;
                }
                let key = (a as *const Pointer as usize, b as *const Pointer as usize);
                if !self.seen.insert(key) {
                    // already comparing this pair further up, assume equal
                    return true;
                }
                self.refs(&a.pointee, &b.pointee)
            }
            (TypeData::Function(a), TypeData::Function(b)) => {
                self.refs(&a.return_type, &b.return_type) && self.ref_lists(&a.params, &b.params)
            }
            (TypeData::Pipe(a), TypeData::Pipe(b)) => a == b,
            (TypeData::ForwardPointer(a), TypeData::ForwardPointer(b)) => {
                a.storage_class == b.storage_class
                    && match (a.target_pointer(), b.target_pointer()) {
                        (Some(a), Some(b)) => a == b,
                        _ => a.target_id == b.target_id,
                    }
            }
            _ => false,
        }
    }
}

struct TypeDisplay<'a> {
    ty: &'a Type,
    pool: &'a TypePool,
}

struct DecorationsDisplay<'a>(&'a [DecorationRecord]);

impl fmt::Display for DecorationsDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "[[")?;
        for (index, decoration) in self.0.iter().enumerate() {
            if index != 0 {
                write!(f, ", ")?;
            }
            let (kind, operands) = match decoration.split_first() {
                Some(v) => v,
                None => continue,
            };
            match Decoration::from_u32(*kind) {
                Some(kind) => write!(f, "{:?}", kind)?,
                None => write!(f, "{}", kind)?,
            }
            if !operands.is_empty() {
                write!(f, "(")?;
                for (index, operand) in operands.iter().enumerate() {
                    if index != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")?;
            }
        }
        write!(f, "]]")
    }
}

impl<'a> fmt::Display for TypeDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let pool: &'a TypePool = self.pool;
        let ty: &'a Type = self.ty;
        let sub = |v: &'a TypeRef| v.resolve(pool).display(pool);
        match &ty.data {
            TypeData::Void => write!(f, "void")?,
            TypeData::Bool => write!(f, "bool")?,
            TypeData::Integer(v) => {
                write!(f, "{}int{}", if v.signed { "" } else { "u" }, v.width)?
            }
            TypeData::Float(v) => write!(f, "float{}", v.width)?,
            TypeData::Vector(v) => write!(f, "<{}, {}>", sub(&v.element), v.count)?,
            TypeData::Matrix(v) => write!(f, "<{}, {}>", sub(&v.element), v.count)?,
            TypeData::Image(v) => write!(
                f,
                "image({}, {:?}, {}, {}, {}, {}, {:?}, {:?})",
                sub(&v.sampled_type),
                v.dim,
                v.depth,
                v.arrayed as u32,
                v.multisampled as u32,
                v.sampled,
                v.format,
                v.access_qualifier
            )?,
            TypeData::Sampler => write!(f, "sampler")?,
            TypeData::SampledImage(v) => write!(f, "sampled_image({})", sub(&v.image))?,
            TypeData::Array(v) => write!(f, "[{}, id({})]", sub(&v.element), v.length_id)?,
            TypeData::RuntimeArray(v) => write!(f, "[{}]", sub(&v.element))?,
            TypeData::Struct(v) => {
                write!(f, "{{")?;
                for (index, element) in v.element_types.iter().enumerate() {
                    if index != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", sub(element))?;
                    if let Some(decorations) = v.element_decorations.get(&(index as u32)) {
                        write!(f, " {}", DecorationsDisplay(decorations))?;
                    }
                }
                write!(f, "}}")?
            }
            TypeData::Opaque(v) => write!(f, "opaque('{}')", v.name)?,
            TypeData::Pointer(v) => write!(f, "{} {:?}*", sub(&v.pointee), v.storage_class)?,
            TypeData::Function(v) => {
                write!(f, "(")?;
                for (index, param) in v.params.iter().enumerate() {
                    if index != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", sub(param))?;
                }
                write!(f, ") -> {}", sub(&v.return_type))?
            }
            TypeData::Event => write!(f, "event")?,
            TypeData::DeviceEvent => write!(f, "device_event")?,
            TypeData::ReserveId => write!(f, "reserve_id")?,
            TypeData::Queue => write!(f, "queue")?,
            TypeData::Pipe(v) => write!(f, "pipe({:?})", v.access_qualifier)?,
            TypeData::ForwardPointer(v) => write!(
                f,
                "forward_pointer(%{}, {:?})",
                v.target_id, v.storage_class
            )?,
            TypeData::PipeStorage => write!(f, "pipe_storage")?,
            TypeData::NamedBarrier => write!(f, "named_barrier")?,
        }
        if !ty.decorations.is_empty() {
            write!(f, " {}", DecorationsDisplay(&ty.decorations))?;
        }
        Ok(())
    }
}
