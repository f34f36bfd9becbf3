//! Native call execution: resolve ABI types, marshal arguments, call through
//! `libffi`, and unmarshal the scalar result.

use dllbridge_pack::LiveValue;
use dllbridge_protocol::Scalar;
use dllbridge_schema::{BaseType, Group, TypeNode};
use libffi::middle::{Arg, Cif, CodePtr, Type};

use crate::abi::{AbiPosition, AbiTypeCache};
use crate::error::ServerError;
use crate::marshal::{apply_writebacks, encode_args};

/// Run one native call. `values` is the server's freshly-unpacked,
/// memsync-hydrated argument tuple; by the time this returns, any position
/// the callee mutated through a pointer has already been written back into
/// it, ready for `pack_return_args`/`pack_memory` to read.
pub fn invoke(
    code: CodePtr,
    arg_schemas: &[TypeNode],
    ret_schema: &TypeNode,
    values: &[LiveValue],
    cache: &mut AbiTypeCache,
) -> Result<Option<Scalar>, ServerError> {
    let arg_types: Vec<Type> = arg_schemas
        .iter()
        .map(|s| cache.resolve(s, AbiPosition::Argument))
        .collect::<Result<_, _>>()?;
    let ret_type = cache.resolve(ret_schema, AbiPosition::Return)?;

    let encoded = encode_args(arg_schemas, values)?;
    let args: Vec<Arg> = (0..arg_schemas.len())
        .map(|i| unsafe { Arg::new(&*encoded.arg_address(i)) })
        .collect();

    // TODO: honor AbiFlavor::Stdcall via a raw ffi_prep_cif with FFI_STDCALL
    // on Windows targets — Cif::new always builds FFI_DEFAULT_ABI.
    let cif = Cif::new(arg_types, ret_type);
    let return_value = unsafe { call_by_return_shape(&cif, code, &args, ret_schema)? };

    apply_writebacks(&encoded)?;
    Ok(return_value)
}

unsafe fn call_by_return_shape(
    cif: &Cif,
    code: CodePtr,
    args: &[Arg],
    ret_schema: &TypeNode,
) -> Result<Option<Scalar>, ServerError> {
    if !ret_schema.modifiers.is_empty() {
        return Err(ServerError::UnsupportedAbi(
            "pointer-returning routines are not supported; report the value through an out parameter instead".into(),
        ));
    }
    match ret_schema.group {
        Group::Void => {
            unsafe { cif.call::<()>(code, args) };
            Ok(None)
        }
        Group::Struct => Err(ServerError::UnsupportedAbi(
            "struct-by-value return is not supported; return through an out-pointer argument instead".into(),
        )),
        Group::Fundamental => {
            let base = ret_schema.base_type.ok_or_else(|| {
                ServerError::UnsupportedAbi("FUNDAMENTAL return node missing a base_type".into())
            })?;
            Ok(Some(unsafe { call_scalar(cif, code, args, base) }))
        }
    }
}

unsafe fn call_scalar(cif: &Cif, code: CodePtr, args: &[Arg], base: BaseType) -> Scalar {
    unsafe {
        match base {
            BaseType::Bool => Scalar::Bool(cif.call::<i8>(code, args) != 0),
            BaseType::Char => Scalar::Char(cif.call::<i8>(code, args) as u8),
            BaseType::I8 => Scalar::I8(cif.call(code, args)),
            BaseType::U8 => Scalar::U8(cif.call(code, args)),
            BaseType::I16 => Scalar::I16(cif.call(code, args)),
            BaseType::U16 => Scalar::U16(cif.call(code, args)),
            BaseType::WChar => Scalar::WChar(cif.call(code, args)),
            BaseType::I32 => Scalar::I32(cif.call(code, args)),
            BaseType::U32 => Scalar::U32(cif.call(code, args)),
            BaseType::I64 => Scalar::I64(cif.call(code, args)),
            BaseType::U64 => Scalar::U64(cif.call(code, args)),
            BaseType::F32 => Scalar::F32(cif.call(code, args)),
            BaseType::F64 => Scalar::F64(cif.call(code, args)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::test_support::FakeLibrary;
    use crate::native::NativeLibrary;
    use dllbridge_schema::Modifier;

    unsafe extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    unsafe extern "C" fn square(x: *mut i32) {
        unsafe {
            *x *= *x;
        }
    }

    #[test]
    fn s1_add_calls_through_and_returns_the_sum() {
        let mut lib = FakeLibrary::new();
        unsafe { lib.register("add", add as *mut std::ffi::c_void) };
        let code = lib.resolve("add").unwrap();

        let arg_schemas = vec![
            TypeNode::fundamental("a", BaseType::I32, vec![]).unwrap(),
            TypeNode::fundamental("b", BaseType::I32, vec![]).unwrap(),
        ];
        let ret_schema = TypeNode::fundamental("ret", BaseType::I32, vec![]).unwrap();
        let values = vec![
            LiveValue::Scalar(Scalar::I32(3)),
            LiveValue::Scalar(Scalar::I32(4)),
        ];

        let mut cache = AbiTypeCache::new();
        let result = invoke(code, &arg_schemas, &ret_schema, &values, &mut cache).unwrap();
        assert_eq!(result, Some(Scalar::I32(7)));
    }

    #[test]
    fn s2_square_mutates_through_the_out_pointer() {
        let mut lib = FakeLibrary::new();
        unsafe { lib.register("square", square as *mut std::ffi::c_void) };
        let code = lib.resolve("square").unwrap();

        let arg_schemas =
            vec![TypeNode::fundamental("x", BaseType::I32, vec![Modifier::Pointer]).unwrap()];
        let ret_schema = TypeNode::void("ret");
        let cell = LiveValue::cell(LiveValue::Scalar(Scalar::I32(6)));
        let LiveValue::Cell(rc) = &cell else {
            unreachable!()
        };

        let mut cache = AbiTypeCache::new();
        let result = invoke(code, &arg_schemas, &ret_schema, &[cell.clone()], &mut cache).unwrap();
        assert_eq!(result, None);
        assert!(matches!(*rc.borrow(), LiveValue::Scalar(Scalar::I32(36))));
    }

    #[test]
    fn pointer_returning_routines_are_rejected() {
        let arg_schemas = vec![];
        let ret_schema =
            TypeNode::fundamental("ret", BaseType::I32, vec![Modifier::Pointer]).unwrap();
        let mut lib = FakeLibrary::new();
        unsafe { lib.register("add", add as *mut std::ffi::c_void) };
        let code = lib.resolve("add").unwrap();
        let mut cache = AbiTypeCache::new();
        let err = invoke(code, &arg_schemas, &ret_schema, &[], &mut cache).unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedAbi(_)));
    }
}
