//! `convert[to=V, from=O]`: data stored as `O`, read and written as `V`.

use std::any::Any;
use std::fmt;

use nd_ckernel::{AssignErrorMode, KernelBuilder, KernelRequest};
use nd_memblock::MemoryBlockRef;

use crate::assign::compile_assignment;
use crate::{EvalContext, ExtendedType, NdError, NdType, TypeFlags, TypeId, TypeKind};

#[derive(Debug)]
pub struct ConvertType {
    value: NdType,
    operand: NdType,
    errmode: AssignErrorMode,
}

impl ConvertType {
    /// Error mode both conversion directions compile with.
    pub fn errmode(&self) -> AssignErrorMode {
        self.errmode
    }
}

/// `operand` may itself be an expression; `value` may not.
pub fn make_convert(value: &NdType, operand: &NdType, errmode: AssignErrorMode) -> Result<NdType, NdError> {
    if value.is_expression() {
        return Err(NdError::construction(format!(
            "convert value type {value} must not be an expression"
        )));
    }
    Ok(NdType::new(ConvertType {
        value: value.clone(),
        operand: operand.clone(),
        errmode,
    }))
}

impl ExtendedType for ConvertType {
    fn type_id(&self) -> TypeId {
        TypeId::Convert
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Expression
    }

    fn data_size(&self) -> usize {
        self.operand.data_size()
    }

    fn alignment(&self) -> usize {
        self.operand.alignment()
    }

    fn metadata_size(&self) -> usize {
        self.operand.metadata_size()
    }

    fn flags(&self) -> TypeFlags {
        self.operand.flags() | TypeFlags::EXPRESSION
    }

    fn ndim(&self) -> usize {
        self.operand.ndim()
    }

    fn default_data_size(&self, shape: &[usize]) -> Option<usize> {
        self.operand.default_data_size(shape)
    }

    fn equals(&self, other: &dyn ExtendedType) -> bool {
        other.as_any().downcast_ref::<Self>().is_some_and(|o| {
            o.value == self.value && o.operand == self.operand && o.errmode == self.errmode
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn value_type(&self) -> Option<&NdType> {
        Some(&self.value)
    }

    fn operand_type(&self) -> Option<&NdType> {
        Some(&self.operand)
    }

    unsafe fn metadata_default_construct(&self, metadata: *mut u8, shape: &[usize]) -> Result<(), NdError> {
        self.operand.metadata_default_construct(metadata, shape)
    }

    unsafe fn metadata_copy_construct(&self, dst: *mut u8, src: *const u8, embedded: Option<&MemoryBlockRef>) {
        self.operand.metadata_copy_construct(dst, src, embedded);
    }

    unsafe fn metadata_reset_buffers(&self, metadata: *const u8) {
        self.operand.metadata_reset_buffers(metadata);
    }

    unsafe fn metadata_destruct(&self, metadata: *mut u8) {
        self.operand.metadata_destruct(metadata);
    }

    fn make_operand_to_value_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_md: *const u8,
        src_md: *const u8,
        request: KernelRequest,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        compile_assignment(
            ckb,
            offset,
            &self.value,
            dst_md,
            self.operand.value_type(),
            src_md,
            request,
            self.errmode,
            ectx,
        )
    }

    fn make_value_to_operand_assignment_kernel(
        &self,
        ckb: &mut KernelBuilder,
        offset: usize,
        dst_md: *const u8,
        src_md: *const u8,
        request: KernelRequest,
        ectx: &EvalContext,
    ) -> Result<usize, NdError> {
        compile_assignment(
            ckb,
            offset,
            self.operand.value_type(),
            dst_md,
            &self.value,
            src_md,
            request,
            self.errmode,
            ectx,
        )
    }
}

impl fmt::Display for ConvertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "convert[to={}, from={}", self.value, self.operand)?;
        if self.errmode != AssignErrorMode::Default {
            write!(f, ", errmode={}", self.errmode)?;
        }
        f.write_str("]")
    }
}
