//! Scenarios S1/S2 (SPEC_FULL.md §8) driven entirely client-side, against
//! an in-process loopback [`Transport`] that plays both sides of the wire
//! so this crate's tests don't need a real `dllbridge-server` or
//! `dllbridge-transport` socket. It understands just enough of the
//! protocol to answer `add` and `square`.
//!
//! Memsync scenarios (S3/S4/S6) exercise a real byte-for-byte snapshot
//! round trip against a native routine that actually mutates the caller's
//! buffer; those are covered end to end in `dllbridge-server`'s own
//! `tests/scenarios.rs` against a `NativeLibrary`. A loopback that never
//! invokes real code has nothing to reverse, so they aren't duplicated here.

use dllbridge_client::{AbiFlavor, BaseType, BridgeError, Declared, LiveValue, Scalar, Session, Transport};
use dllbridge_protocol::{ArgPayload, ArgTree, BridgeRequest, BridgeResponse, CallResult, SessionStatus};
use std::cell::RefCell;
use std::rc::Rc;

struct Loopback {
    configured: RefCell<bool>,
}

impl Transport for Loopback {
    fn send(&mut self, request: BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        Ok(match request {
            BridgeRequest::AccessLibrary { .. } => BridgeResponse::Ack(true),
            BridgeRequest::RegisterRoutine { .. } => BridgeResponse::Ack(true),
            BridgeRequest::RegisterArgtypeAndRestype { .. } => {
                *self.configured.borrow_mut() = true;
                BridgeResponse::Ack(true)
            }
            BridgeRequest::CallRoutine {
                symbol_name, args, ..
            } => {
                assert!(*self.configured.borrow(), "call before configure");
                match symbol_name.as_str() {
                    "add" => {
                        let (a, b) = (args.get(0).unwrap(), args.get(1).unwrap());
                        let (ArgPayload::Scalar(Scalar::I32(a)), ArgPayload::Scalar(Scalar::I32(b))) =
                            (a, b)
                        else {
                            panic!("unexpected add args");
                        };
                        BridgeResponse::Call(CallResult {
                            args: ArgTree::new(vec![
                                ("a".into(), ArgPayload::Null),
                                ("b".into(), ArgPayload::Null),
                            ]),
                            return_value: Some(Scalar::I32(a + b)),
                            memory: Vec::new(),
                        })
                    }
                    "square" => {
                        let ArgPayload::Scalar(Scalar::I32(x)) = args.get(0).unwrap() else {
                            panic!("unexpected square arg");
                        };
                        BridgeResponse::Call(CallResult {
                            args: ArgTree::new(vec![(
                                "x".into(),
                                ArgPayload::Scalar(Scalar::I32(x * x)),
                            )]),
                            return_value: None,
                            memory: Vec::new(),
                        })
                    }
                    other => panic!("loopback: unknown routine {other}"),
                }
            }
            BridgeRequest::GetStatus => BridgeResponse::Status(SessionStatus::Up),
            BridgeRequest::Terminate => BridgeResponse::Terminated,
        })
    }
}

#[test]
fn s1_add_returns_seven() {
    let session = Session::new(Loopback {
        configured: RefCell::new(false),
    });
    let lib = session
        .access_library("Z:\\libs\\math.dll", "/opt/libs/math.dll", "math", AbiFlavor::Cdecl)
        .unwrap();
    let routine = lib
        .register_routine(
            "add",
            vec![
                ("a".into(), Declared::Fundamental(BaseType::I32)),
                ("b".into(), Declared::Fundamental(BaseType::I32)),
            ],
            Declared::Fundamental(BaseType::I32),
            vec![],
        )
        .unwrap();

    let values = vec![
        LiveValue::Scalar(Scalar::I32(3)),
        LiveValue::Scalar(Scalar::I32(4)),
    ];
    let outcome = routine.call(&values).unwrap();
    assert_eq!(outcome.return_value, Some(Scalar::I32(7)));
}

#[test]
fn s2_square_mutates_caller_cell() {
    let session = Session::new(Loopback {
        configured: RefCell::new(false),
    });
    let lib = session
        .access_library("Z:\\libs\\math.dll", "/opt/libs/math.dll", "math", AbiFlavor::Cdecl)
        .unwrap();
    let routine = lib
        .register_routine(
            "square",
            vec![(
                "x".into(),
                Declared::Pointer(Box::new(Declared::Fundamental(BaseType::I32))),
            )],
            Declared::Void,
            vec![],
        )
        .unwrap();

    let cell = Rc::new(RefCell::new(LiveValue::Scalar(Scalar::I32(5))));
    let values = vec![LiveValue::Cell(Rc::clone(&cell))];
    routine.call(&values).unwrap();
    assert!(matches!(*cell.borrow(), LiveValue::Scalar(Scalar::I32(25))));
}

#[test]
fn configure_is_only_sent_once() {
    let session = Session::new(Loopback {
        configured: RefCell::new(false),
    });
    let lib = session
        .access_library("Z:\\libs\\math.dll", "/opt/libs/math.dll", "math", AbiFlavor::Cdecl)
        .unwrap();
    let routine = lib
        .register_routine(
            "add",
            vec![
                ("a".into(), Declared::Fundamental(BaseType::I32)),
                ("b".into(), Declared::Fundamental(BaseType::I32)),
            ],
            Declared::Fundamental(BaseType::I32),
            vec![],
        )
        .unwrap();

    let values = vec![
        LiveValue::Scalar(Scalar::I32(1)),
        LiveValue::Scalar(Scalar::I32(2)),
    ];
    routine.call(&values).unwrap();
    // Second call must not panic the loopback's `NotConfigured`-style
    // assertion, and must reuse the cached schema rather than sending
    // RegisterArgtypeAndRestype again.
    let outcome = routine.call(&values).unwrap();
    assert_eq!(outcome.return_value, Some(Scalar::I32(3)));
}
