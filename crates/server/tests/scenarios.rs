//! End-to-end scenarios S1-S6 (SPEC_FULL.md §8), driven through the
//! `Coordinator` exactly as a real client session would: register the
//! library, register the routine, push its schema, then call it and read
//! back the reply. The native side is `dllbridge-fixture-dll`'s plain
//! `extern "C" fn`s, wired in through `FakeLibrary` so the test doesn't need
//! a real `dlopen` or a Wine install.

use dllbridge_fixture::{add, buffer_checksum, dot, reverse, square, sum};
use dllbridge_protocol::{
    AbiFlavor, ArgPayload, ArgTree, BridgeRequest, BridgeResponse, ByteBlock, MemSyncSpec, Scalar,
};
use dllbridge_schema::{BaseType, Modifier, TypeNode};
use dllbridge_server::test_support::FakeLibrary;
use dllbridge_server::{BridgeConfig, Coordinator};

/// Build a coordinator with one fake library (`"fixture"`) holding every
/// `dllbridge-fixture-dll` symbol the scenarios below exercise, already
/// through `RegisterRoutine` so each test only has to push its own schema.
fn coordinator_with(symbols: &[(&str, *mut std::ffi::c_void)]) -> Coordinator {
    let coordinator = Coordinator::new(BridgeConfig::default());
    let mut fake = FakeLibrary::new();
    for (name, ptr) in symbols {
        unsafe { fake.register(name, *ptr) };
    }
    coordinator.insert_library_for_testing("fixture", Box::new(fake), AbiFlavor::Cdecl);
    for (name, _) in symbols {
        let response = coordinator.handle(BridgeRequest::RegisterRoutine {
            library_id: "fixture".to_string(),
            symbol_name: name.to_string(),
        });
        assert_eq!(response, BridgeResponse::Ack(true));
    }
    coordinator
}

fn configure(
    coordinator: &Coordinator,
    symbol_name: &str,
    arg_schemas: Vec<TypeNode>,
    ret_schema: TypeNode,
    memsync: Vec<MemSyncSpec>,
) {
    let response = coordinator.handle(BridgeRequest::RegisterArgtypeAndRestype {
        library_id: "fixture".to_string(),
        symbol_name: symbol_name.to_string(),
        arg_schemas,
        ret_schema,
        memsync,
    });
    assert_eq!(response, BridgeResponse::Ack(true));
}

fn call(coordinator: &Coordinator, symbol_name: &str, args: ArgTree, memory: Vec<ByteBlock>) -> dllbridge_protocol::CallResult {
    match coordinator.handle(BridgeRequest::CallRoutine {
        library_id: "fixture".to_string(),
        symbol_name: symbol_name.to_string(),
        args,
        memory,
    }) {
        BridgeResponse::Call(result) => result,
        other => panic!("expected a Call response for {symbol_name}, got {other:?}"),
    }
}

#[test]
fn s1_add_returns_seven() {
    let coordinator = coordinator_with(&[("add", add as *mut std::ffi::c_void)]);
    configure(
        &coordinator,
        "add",
        vec![
            TypeNode::fundamental("a", BaseType::I32, vec![]).unwrap(),
            TypeNode::fundamental("b", BaseType::I32, vec![]).unwrap(),
        ],
        TypeNode::fundamental("ret", BaseType::I32, vec![]).unwrap(),
        vec![],
    );
    let args = ArgTree::new(vec![
        ("a".into(), ArgPayload::Scalar(Scalar::I32(3))),
        ("b".into(), ArgPayload::Scalar(Scalar::I32(4))),
    ]);
    let result = call(&coordinator, "add", args, vec![]);
    assert_eq!(result.return_value, Some(Scalar::I32(7)));
    assert_eq!(result.args.get(0), Some(&ArgPayload::Null));
    assert_eq!(result.args.get(1), Some(&ArgPayload::Null));
}

#[test]
fn s2_square_mutates_the_out_pointer() {
    let coordinator = coordinator_with(&[("square", square as *mut std::ffi::c_void)]);
    configure(
        &coordinator,
        "square",
        vec![TypeNode::fundamental("x", BaseType::I32, vec![Modifier::Pointer]).unwrap()],
        TypeNode::void("ret"),
        vec![],
    );
    let args = ArgTree::new(vec![("x".into(), ArgPayload::Scalar(Scalar::I32(5)))]);
    let result = call(&coordinator, "square", args, vec![]);
    assert_eq!(result.return_value, None);
    assert_eq!(result.args.get(0), Some(&ArgPayload::Scalar(Scalar::I32(25))));
}

#[test]
fn s3_sum_leaves_the_buffer_unmodified() {
    let coordinator = coordinator_with(&[("sum", sum as *mut std::ffi::c_void)]);
    configure(
        &coordinator,
        "sum",
        vec![
            TypeNode::void("buf"),
            TypeNode::fundamental("n", BaseType::I32, vec![]).unwrap(),
        ],
        TypeNode::fundamental("ret", BaseType::I64, vec![]).unwrap(),
        vec![MemSyncSpec::new(vec![0.into()], vec![1.into()]).with_element_type(BaseType::I32)],
    );
    let bytes: Vec<u8> = [1i32, 2, 3, 4].iter().flat_map(|v| v.to_ne_bytes()).collect();
    let args = ArgTree::new(vec![
        ("buf".into(), ArgPayload::Null),
        ("n".into(), ArgPayload::Scalar(Scalar::I32(4))),
    ]);
    let result = call(&coordinator, "sum", args, vec![ByteBlock(bytes.clone())]);
    assert_eq!(result.return_value, Some(Scalar::I64(10)));
    assert_eq!(result.memory, vec![ByteBlock(bytes)]);
}

#[test]
fn s4_reverse_mutates_the_buffer_in_place() {
    let coordinator = coordinator_with(&[("reverse", reverse as *mut std::ffi::c_void)]);
    configure(
        &coordinator,
        "reverse",
        vec![
            TypeNode::void("buf"),
            TypeNode::fundamental("n", BaseType::I32, vec![]).unwrap(),
        ],
        TypeNode::void("ret"),
        vec![MemSyncSpec::new(vec![0.into()], vec![1.into()])],
    );
    let args = ArgTree::new(vec![
        ("buf".into(), ArgPayload::Null),
        ("n".into(), ArgPayload::Scalar(Scalar::I32(3))),
    ]);
    let result = call(&coordinator, "reverse", args, vec![ByteBlock(vec![1, 2, 3])]);
    assert_eq!(result.memory, vec![ByteBlock(vec![3, 2, 1])]);
}

fn point_schema(name: &str) -> TypeNode {
    let fields = vec![
        TypeNode::fundamental("x", BaseType::F64, vec![]).unwrap(),
        TypeNode::fundamental("y", BaseType::F64, vec![]).unwrap(),
    ];
    TypeNode::struct_ref(name, "Point", fields, vec![]).unwrap()
}

fn point_payload(x: f64, y: f64) -> ArgPayload {
    ArgPayload::Struct(ArgTree::new(vec![
        ("x".into(), ArgPayload::Scalar(Scalar::F64(x))),
        ("y".into(), ArgPayload::Scalar(Scalar::F64(y))),
    ]))
}

#[test]
fn s5_dot_computes_the_dot_product_and_caches_the_struct_layout() {
    let coordinator = coordinator_with(&[("dot", dot as *mut std::ffi::c_void)]);
    configure(
        &coordinator,
        "dot",
        vec![point_schema("a"), point_schema("b")],
        TypeNode::fundamental("ret", BaseType::F64, vec![]).unwrap(),
        vec![],
    );
    let args = ArgTree::new(vec![
        ("a".into(), point_payload(1.0, 2.0)),
        ("b".into(), point_payload(3.0, 4.0)),
    ]);
    // Two calls: the second exercises the server's struct-type cache
    // (spec.md §3: "materialised lazily ... cached and reused").
    for _ in 0..2 {
        let result = call(&coordinator, "dot", args.clone(), vec![]);
        assert_eq!(result.return_value, Some(Scalar::F64(11.0)));
    }
}

#[test]
fn s6_nested_memsync_traverses_a_pointer_and_a_struct_field() {
    // struct Buffer { uint8_t* data; int len }, routine takes `Buffer*`.
    let coordinator = coordinator_with(&[("buffer_checksum", buffer_checksum as *mut std::ffi::c_void)]);
    let data_field = TypeNode::void("data");
    let len_field = TypeNode::fundamental("len", BaseType::I32, vec![]).unwrap();
    let buffer_struct = TypeNode::struct_ref(
        "buf",
        "Buffer",
        vec![data_field, len_field],
        vec![Modifier::Pointer],
    )
    .unwrap();

    configure(
        &coordinator,
        "buffer_checksum",
        vec![buffer_struct],
        TypeNode::fundamental("ret", BaseType::I64, vec![]).unwrap(),
        vec![MemSyncSpec::new(
            vec![0.into(), "data".into()],
            vec![0.into(), "len".into()],
        )],
    );

    let args = ArgTree::new(vec![(
        "buf".into(),
        ArgPayload::Struct(ArgTree::new(vec![
            ("data".into(), ArgPayload::Null),
            ("len".into(), ArgPayload::Scalar(Scalar::I32(3))),
        ])),
    )]);
    let result = call(&coordinator, "buffer_checksum", args, vec![ByteBlock(vec![1, 2, 3])]);
    assert_eq!(result.return_value, Some(Scalar::I64(6)));
}
