use bytes::BufMut;
use itertools::Itertools;
use proptest::collection::vec;
use proptest::prelude::*;

use crate::encoding::{reject_unknown_fields, RawValue, WireType};
use crate::{
    DecodeErrorKind, DecodeOptions, DescriptorError, FieldDescriptor, LogicalKind, Message,
    MessageDescriptor, MutableValue, RawRecord, Record, ReflectErrorKind, Registry, ScalarKind,
    Value,
};

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "test.Duration")]
struct Span {
    seconds: i64,
    nanos: i32,
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "test.Module")]
struct Module {
    #[reflect(number = 1)]
    duration: Option<Span>,
    a: u64,
    b: u64,
    c: u64,
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "test.Tree")]
struct Tree {
    name: String,
    payload: Vec<u8>,
    flag: bool,
    delta: i32,
    children: Vec<Tree>,
    #[reflect(oneof = "choice", number = 7)]
    label: Option<String>,
    #[reflect(oneof = "choice")]
    id: Option<u64>,
    #[reflect(oneof = "choice")]
    module: Option<Module>,
    next: Option<Box<Tree>>,
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

static_assertions::assert_impl_all!(MessageDescriptor: Send, Sync);
static_assertions::assert_impl_all!(Tree: Message, Clone, Send, Sync);
static_assertions::assert_obj_safe!(crate::RawRecord, crate::RepeatedRecords);

fn field(descriptor: &'static MessageDescriptor, name: &str) -> &'static FieldDescriptor {
    descriptor
        .field_by_name(name)
        .unwrap_or_else(|| panic!("{} has no field {}", descriptor.full_name(), name))
}

#[test]
fn derived_descriptors() {
    let descriptor = Tree::static_descriptor();
    assert_eq!(descriptor.full_name(), "test.Tree");
    assert_eq!(
        descriptor
            .fields()
            .iter()
            .map(|field| (field.number(), field.name()))
            .collect_vec(),
        [
            (1, "name"),
            (2, "payload"),
            (3, "flag"),
            (4, "delta"),
            (5, "children"),
            (7, "label"),
            (8, "id"),
            (9, "module"),
            (10, "next"),
        ]
    );
    assert_eq!(field(descriptor, "delta").full_name(), "test.Tree.delta");
    assert_eq!(
        field(descriptor, "delta").kind(),
        LogicalKind::Scalar(ScalarKind::Int32)
    );
    assert!(field(descriptor, "children").is_repeated());
    let next = field(descriptor, "next").kind().message_type().unwrap();
    assert!(std::ptr::eq(next.descriptor(), descriptor));

    let choice = descriptor.oneof_by_name("choice").unwrap();
    assert_eq!(choice.full_name(), "test.Tree.choice");
    assert_eq!(choice.field_numbers(), [7, 8, 9]);
    assert!(descriptor.oneof_of(field(descriptor, "name")).is_none());

    // Descriptors are built once.
    assert!(std::ptr::eq(Tree::default().descriptor(), descriptor));
    assert!(std::ptr::eq(crate::descriptor_for::<Tree>(), descriptor));
}

#[test]
fn single_varint_field_encoding() {
    let span = Span {
        seconds: 42,
        ..Default::default()
    };
    assert_eq!(span.encode_to_vec(), [0x08, 0x2a]);
    assert_eq!(span.encoded_len(), 2);
    assert_eq!(crate::marshal(&span), [0x08, 0x2a]);
}

#[test]
fn absent_nested_record_encodes_nothing() {
    let module = Module::default();
    assert_eq!(module.encoded_len(), 0);
    assert!(module.encode_to_vec().is_empty());

    // A present but empty nested record is still written.
    let module = Module {
        duration: Some(Span::default()),
        ..Default::default()
    };
    assert_eq!(module.encode_to_vec(), [0x0a, 0x00]);
    assert_eq!(Module::decode([0x0a, 0x00].as_slice()), Ok(module));
}

#[test]
fn decoded_field_is_present() {
    let span = Span::decode([0x08, 0x2a].as_slice()).unwrap();
    let seconds = field(Span::static_descriptor(), "seconds");
    let nanos = field(Span::static_descriptor(), "nanos");
    let view = span.view();
    assert!(view.has(seconds).unwrap());
    assert_eq!(view.get(seconds).unwrap().as_i64(), Some(42));
    assert!(!view.has(nanos).unwrap());
    assert_eq!(view.get(nanos).unwrap().as_i32(), Some(0));
}

#[test]
fn unknown_fields_reencoded_after_known_fields() {
    let unknown = [0x2a, 0x03, 0x01, 0x02, 0x03];
    let mut input = unknown.to_vec();
    input.extend_from_slice(&[0x10, 0x07]);

    let module = Module::decode(input.as_slice()).unwrap();
    assert_eq!(module.a, 7);
    assert_eq!(module.unknown_fields, unknown);
    assert_eq!(module.view().get_unknown(), unknown);
    assert_eq!(
        module.encode_to_vec(),
        [0x10, 0x07, 0x2a, 0x03, 0x01, 0x02, 0x03]
    );
    assert_eq!(module.encoded_len(), 7);
}

#[test]
fn unknown_fields_can_be_discarded() {
    let input = [0x2a, 0x03, 0x01, 0x02, 0x03, 0x10, 0x07];
    let module =
        Module::decode_with_options(input.as_slice(), &DecodeOptions::discarding_unknown())
            .unwrap();
    assert_eq!(
        module,
        Module {
            a: 7,
            ..Default::default()
        }
    );
}

#[test]
fn negative_values_roundtrip() {
    let tree = Tree {
        delta: -1,
        ..Default::default()
    };
    let encoded = tree.encode_to_vec();
    // Negative 32-bit values are sign-extended to ten bytes.
    assert_eq!(encoded.len(), 11);
    assert_eq!(Tree::decode(encoded.as_slice()), Ok(tree));
}

#[test]
fn malformed_input() {
    let cases: [(&[u8], DecodeErrorKind); 7] = [
        (&[0x10, 0x80], DecodeErrorKind::UnexpectedEof),
        // A balanced group under undeclared field 5 is refused, not preserved.
        (&[0x2b, 0x08, 0x01, 0x2c], DecodeErrorKind::UnsupportedGroupEncoding),
        (
            &[0x10, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01],
            DecodeErrorKind::IntOverflow,
        ),
        (&[0x0b], DecodeErrorKind::UnsupportedGroupEncoding),
        (&[0x0f, 0x00], DecodeErrorKind::MalformedTag),
        (&[0x00, 0x00], DecodeErrorKind::MalformedTag),
        (&[0x0a, 0x05, 0x00], DecodeErrorKind::UnexpectedEof),
    ];
    for (input, kind) in cases {
        assert_eq!(
            Module::decode(input).unwrap_err().kind(),
            kind,
            "decoding {:02x?}",
            input
        );
    }
    assert_eq!(
        Tree::decode([0x0a, 0x01, 0xff].as_slice())
            .unwrap_err()
            .kind(),
        DecodeErrorKind::InvalidUtf8
    );
}

#[test]
fn wire_type_mismatch() {
    let err = Span::decode([0x08, 0x01, 0x0a, 0x00].as_slice()).unwrap_err();
    assert_eq!(err.offset(), 2);
    assert_eq!(
        err.kind(),
        DecodeErrorKind::WireTypeMismatch {
            field: "test.Duration.seconds",
            expected: WireType::Varint,
            actual: WireType::LengthDelimited,
        }
    );
}

#[cfg(feature = "detailed-errors")]
#[test]
fn nested_errors_carry_their_path() {
    // next { name: <invalid utf-8> }
    let err = Tree::decode([0x52, 0x03, 0x0a, 0x01, 0xff].as_slice()).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::InvalidUtf8);
    assert_eq!(err.offset(), 3);
    assert_eq!(err.path(), [("test.Tree", "name"), ("test.Tree", "next")]);
    assert_eq!(
        err.to_string(),
        "failed to decode message at offset 3: test.Tree.next: test.Tree.name: string field is \
        not valid UTF-8"
    );
}

#[cfg(not(feature = "no-recursion-limit"))]
#[test]
fn recursion_limit() {
    fn nested(depth: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        for _ in 0..depth {
            let mut outer = vec![0x52];
            crate::encode_length_delimiter(buf.len(), &mut outer).unwrap();
            outer.extend_from_slice(&buf);
            buf = outer;
        }
        buf
    }

    assert!(Tree::decode(nested(crate::RECURSION_LIMIT).as_slice()).is_ok());
    assert_eq!(
        Tree::decode(nested(crate::RECURSION_LIMIT + 1).as_slice())
            .unwrap_err()
            .kind(),
        DecodeErrorKind::RecursionLimitReached
    );
    let options = DecodeOptions {
        recursion_limit: 2,
        ..Default::default()
    };
    assert!(Tree::decode_with_options(nested(2).as_slice(), &options).is_ok());
    assert!(Tree::decode_with_options(nested(3).as_slice(), &options).is_err());
}

#[test]
fn merge_accumulates() {
    let tree = Tree {
        name: "x".into(),
        children: vec![Tree::default()],
        ..Default::default()
    };
    let encoded = tree.encode_to_vec();
    let mut merged = Tree::decode(encoded.as_slice()).unwrap();
    merged.merge(encoded.as_slice()).unwrap();
    assert_eq!(merged.name, "x");
    assert_eq!(merged.children.len(), 2);

    let mut module = Module {
        duration: Some(Span {
            seconds: 1,
            ..Default::default()
        }),
        ..Default::default()
    };
    let later = Module {
        duration: Some(Span {
            nanos: 2,
            ..Default::default()
        }),
        a: 3,
        ..Default::default()
    };
    module.merge(later.encode_to_vec().as_slice()).unwrap();
    let duration = module.duration.as_ref().unwrap();
    assert_eq!((duration.seconds, duration.nanos, module.a), (1, 2, 3));
}

#[test]
fn replace_from_clears_on_error() {
    let mut module = Module {
        a: 1,
        unknown_fields: vec![0x28, 0x01],
        ..Default::default()
    };
    module.replace_from([0x18, 0x05].as_slice()).unwrap();
    assert_eq!(
        module,
        Module {
            b: 5,
            ..Default::default()
        }
    );
    assert!(module.replace_from([0x18].as_slice()).is_err());
    assert_eq!(module, Module::default());
}

#[test]
fn oneof_members_replace_each_other() {
    // label = "x", then id = 5
    let tree = Tree::decode([0x3a, 0x01, b'x', 0x40, 0x05].as_slice()).unwrap();
    assert_eq!(tree.label, None);
    assert_eq!(tree.id, Some(5));
    assert_eq!(
        tree.view().which_oneof("choice").unwrap().map(|f| f.name()),
        Some("id")
    );
    assert_eq!(
        tree.view()
            .which_oneof("test.Tree.choice")
            .unwrap()
            .map(|f| f.number()),
        Some(8)
    );
    assert_eq!(Tree::default().view().which_oneof("choice"), Ok(None));
    assert_eq!(
        tree.view().which_oneof("nope").unwrap_err().kind(),
        ReflectErrorKind::UnknownOneof
    );
}

#[test]
fn zero_oneof_member_stays_selected() {
    // label = "x", then id = 0
    let encoded = [0x3a, 0x01, b'x', 0x40, 0x00];
    let tree = Tree::decode(encoded.as_slice()).unwrap();
    assert_eq!(tree.label, None);
    assert_eq!(tree.id, Some(0));
    let id = field(Tree::static_descriptor(), "id");
    assert!(tree.view().has(id).unwrap());
    assert_eq!(
        tree.view().which_oneof("choice").unwrap().map(|f| f.name()),
        Some("id")
    );
    assert_eq!(tree.encoded_len(), 2);
    assert_eq!(tree.encode_to_vec(), [0x40, 0x00]);

    let mut tree = Tree::default();
    let mut reflect = tree.reflect();
    reflect.set(id, Value::from(0u64)).unwrap();
    assert!(reflect.has(id).unwrap());
    reflect.set(field(Tree::static_descriptor(), "label"), Value::from("")).unwrap();
    assert!(!reflect.has(id).unwrap());
    drop(reflect);
    assert_eq!(tree.label.as_deref(), Some(""));
    assert_eq!(tree.encode_to_vec(), [0x3a, 0x00]);
}

#[test]
fn encode_into_buffers() {
    let module = Module {
        a: 300,
        ..Default::default()
    };
    let mut small = [0u8; 2];
    let err = module.encode(&mut small.as_mut_slice()).unwrap_err();
    assert_eq!((err.required_capacity(), err.remaining()), (3, 2));

    let mut buf = Vec::new();
    module.encode(&mut buf).unwrap();
    assert_eq!(buf, [0x10, 0xac, 0x02]);
    assert_eq!(module.encode_to_bytes(), buf);

    let delimited = module.encode_length_delimited_to_vec();
    assert_eq!(delimited, [0x03, 0x10, 0xac, 0x02]);
    let mut streamed = Vec::new();
    module.encode_length_delimited(&mut streamed).unwrap();
    assert_eq!(streamed, delimited);
    assert_eq!(Module::decode_length_delimited(delimited.as_slice()), Ok(module));
    assert_eq!(
        Module::decode_length_delimited([0x05, 0x08].as_slice())
            .unwrap_err()
            .kind(),
        DecodeErrorKind::UnexpectedEof
    );
}

#[test]
fn encode_fills_chunks_in_place_or_staged() {
    let module = Module {
        a: 300,
        b: 5,
        c: 1,
        ..Default::default()
    };
    let expected = module.encode_to_vec();
    assert_eq!(expected.len(), 7);

    // One chunk large enough for the whole record, with room to spare.
    let mut whole = [0xffu8; 9];
    let mut cursor = whole.as_mut_slice();
    module.encode(&mut cursor).unwrap();
    assert_eq!(cursor.len(), 2);
    assert_eq!(&whole[..7], expected.as_slice());
    assert_eq!(&whole[7..], [0xff, 0xff]);

    let mut reserved = Vec::with_capacity(expected.len());
    module.encode(&mut reserved).unwrap();
    assert_eq!(reserved, expected);

    // Chunks smaller than the record: the encoding is split across them.
    let mut first = [0u8; 3];
    let mut second = [0u8; 6];
    let mut chained = first.as_mut_slice().chain_mut(second.as_mut_slice());
    module.encode(&mut chained).unwrap();
    assert_eq!(chained.remaining_mut(), 2);
    assert_eq!(first, expected[..3]);
    assert_eq!(second[..4], expected[3..]);

    let mut first = [0u8; 2];
    let mut second = [0u8; 6];
    let mut chained = first.as_mut_slice().chain_mut(second.as_mut_slice());
    module.encode_length_delimited(&mut chained).unwrap();
    assert_eq!(first, [0x07, expected[0]]);
    assert_eq!(second, expected[1..]);
}

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "test.Wide")]
struct Wide {
    #[reflect(number = 16)]
    a: u64,
    #[reflect(number = 2048)]
    s: String,
    #[reflect(number = 300000)]
    inner: Option<Module>,
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

#[test]
fn multi_byte_keys() {
    let wide = Wide {
        a: 1,
        s: "x".into(),
        inner: Some(Module::default()),
        ..Default::default()
    };
    assert_eq!(
        wide.encode_to_vec(),
        [
            0x80, 0x01, 0x01, // 16 << 3
            0x82, 0x80, 0x01, 0x01, b'x', // 2048 << 3 | 2
            0x82, 0xbe, 0x92, 0x01, 0x00, // 300000 << 3 | 2
        ]
    );
    assert_eq!(wide.encoded_len(), 13);
    assert_eq!(Wide::decode(wide.encode_to_vec().as_slice()), Ok(wide));
}

fn tree_strategy() -> impl Strategy<Value = Tree> {
    let leaf = (
        ".{0,8}",
        vec(any::<u8>(), 0..8),
        any::<bool>(),
        any::<i32>(),
        proptest::option::of(any::<u64>()),
    )
        .prop_map(|(name, payload, flag, delta, id)| Tree {
            name,
            payload,
            flag,
            delta,
            id,
            ..Default::default()
        });
    leaf.prop_recursive(3, 24, 3, |inner| {
        (
            inner.clone(),
            vec(inner.clone(), 0..3),
            proptest::option::of(inner.clone()),
            proptest::option::of((any::<u64>(), any::<i64>(), any::<i32>())),
        )
            .prop_map(|(mut tree, children, next, module)| {
                tree.children = children;
                tree.next = next.map(Box::new);
                if let Some((a, seconds, nanos)) = module {
                    tree.id = None;
                    tree.module = Some(Module {
                        duration: Some(Span {
                            seconds,
                            nanos,
                            ..Default::default()
                        }),
                        a,
                        ..Default::default()
                    });
                }
                tree
            })
    })
}

proptest! {
    #[test]
    fn roundtrip_and_size(tree in tree_strategy()) {
        let encoded = tree.encode_to_vec();
        prop_assert_eq!(encoded.len(), tree.encoded_len());
        prop_assert_eq!(encoded.len(), crate::size(&tree));
        prop_assert_eq!(Tree::decode(encoded.as_slice()).unwrap(), tree);
    }

    #[test]
    fn wide_roundtrip_and_size(
        a in any::<u64>(),
        s in ".{0,200}",
        inner in proptest::option::of(any::<u64>()),
    ) {
        let wide = Wide {
            a,
            s,
            inner: inner.map(|c| Module { c, ..Default::default() }),
            ..Default::default()
        };
        let encoded = crate::marshal(&wide);
        prop_assert_eq!(encoded.len(), crate::size(&wide));
        prop_assert_eq!(Wide::decode(encoded.as_slice()).unwrap(), wide);
    }

    #[test]
    fn unknown_fields_survive(
        a in any::<u64>(),
        number in 5u32..2000,
        value in any::<u64>(),
        payload in vec(any::<u8>(), 0..16),
    ) {
        let module = Module { a, ..Default::default() };
        let known = module.encode_to_vec();
        let mut unknown = Vec::new();
        RawValue::Varint(value).encode(number, &mut unknown);
        RawValue::LengthDelimited(&payload).encode(number + 1, &mut unknown);
        RawValue::fixed_u32(value as u32).encode(number + 2, &mut unknown);

        let mut input = unknown.clone();
        input.extend_from_slice(&known);
        let decoded = Module::decode(input.as_slice()).unwrap();
        prop_assert_eq!(decoded.a, a);
        prop_assert_eq!(&decoded.unknown_fields, &unknown);

        let mut expected = known;
        expected.extend_from_slice(&unknown);
        prop_assert_eq!(decoded.encode_to_vec(), expected);
    }
}

#[test]
fn presence_follows_set_and_clear() {
    let descriptor = Tree::static_descriptor();
    let values = [
        ("name", Value::from("n")),
        ("payload", Value::from(vec![1u8])),
        ("flag", Value::from(true)),
        ("delta", Value::from(-3i32)),
        (
            "children",
            Value::List(vec![Box::new(Tree::default()) as Box<dyn RawRecord>]),
        ),
        ("label", Value::from("l")),
        ("id", Value::from(5u64)),
        ("module", Value::message(Module::default())),
        ("next", Value::message(Tree::default())),
    ];
    let mut tree = Tree::default();
    let mut reflect = tree.reflect();
    for (name, value) in values {
        let fd = field(descriptor, name);
        assert!(!reflect.has(fd).unwrap(), "{} present before set", name);
        reflect.set(fd, value).unwrap();
        assert!(reflect.has(fd).unwrap(), "{} absent after set", name);
        reflect.clear(fd).unwrap();
        assert!(!reflect.has(fd).unwrap(), "{} present after clear", name);
    }
    drop(reflect);
    assert_eq!(tree, Tree::default());

    // Zero scalars are absent.
    let mut reflect = tree.reflect();
    reflect.set(field(descriptor, "delta"), Value::from(0i32)).unwrap();
    assert!(!reflect.has(field(descriptor, "delta")).unwrap());
}

#[test]
fn reflection_writes_through() {
    let descriptor = Tree::static_descriptor();
    let mut tree = Tree::default();
    {
        let mut reflect = tree.reflect();
        reflect.set(field(descriptor, "name"), Value::from("root")).unwrap();
        reflect.set(field(descriptor, "id"), Value::from(9u64)).unwrap();
        assert_eq!(
            reflect.which_oneof("choice").unwrap().map(|f| f.name()),
            Some("id")
        );
        // Setting another member clears the current one.
        reflect.set(field(descriptor, "label"), Value::from("l")).unwrap();
        assert_eq!(
            reflect.get(field(descriptor, "id")).unwrap().as_u64(),
            Some(0)
        );
        assert_eq!(
            reflect
                .set(field(descriptor, "flag"), Value::from(1u64))
                .unwrap_err()
                .kind(),
            ReflectErrorKind::TypeMismatch
        );
        assert_eq!(
            reflect
                .set(field(descriptor, "module"), Value::message(Span::default()))
                .unwrap_err()
                .kind(),
            ReflectErrorKind::TypeMismatch
        );
    }
    assert_eq!(tree.name, "root");
    assert_eq!(tree.label.as_deref(), Some("l"));
    assert_eq!(tree.id, None);

    let mut reflect = tree.reflect();
    assert!(reflect.downcast_mut::<Module>().is_none());
    assert!(reflect.view().downcast_ref::<Tree>().is_some());
    reflect.downcast_mut::<Tree>().unwrap().flag = true;
    assert!(tree.flag);
}

#[test]
fn mutable_allocates_nested_records() {
    let tree_descriptor = Tree::static_descriptor();
    let module_descriptor = Module::static_descriptor();
    let mut tree = Tree {
        id: Some(4),
        ..Default::default()
    };
    {
        let mut reflect = tree.reflect();
        assert!(!reflect.has(field(tree_descriptor, "module")).unwrap());
        let MutableValue::Message(mut module) =
            reflect.mutable(field(tree_descriptor, "module")).unwrap()
        else {
            panic!("expected a nested record");
        };
        assert_eq!(module.descriptor().full_name(), "test.Module");
        module.set(field(module_descriptor, "a"), Value::from(11u64)).unwrap();
        let duration = module
            .mutable(field(module_descriptor, "duration"))
            .unwrap()
            .into_message()
            .unwrap();
        drop(duration);

        assert_eq!(
            reflect
                .mutable(field(tree_descriptor, "name"))
                .unwrap_err()
                .kind(),
            ReflectErrorKind::NotMutable
        );
    }
    assert_eq!(tree.id, None);
    let module = tree.module.as_ref().unwrap();
    assert_eq!(module.a, 11);
    assert_eq!(module.duration, Some(Span::default()));

    // Boxed self-referential fields work the same way.
    let mut reflect = tree.reflect();
    let next = reflect
        .mutable(field(tree_descriptor, "next"))
        .unwrap()
        .into_message()
        .unwrap();
    assert!(next.into_view().downcast_ref::<Tree>().is_some());
    assert_eq!(tree.next, Some(Box::default()));
}

#[test]
fn unset_nested_records_read_as_empty_views() {
    let tree = Tree::default();
    let view = tree.view();
    let module = view
        .get(field(Tree::static_descriptor(), "module"))
        .unwrap()
        .as_message()
        .unwrap();
    assert!(!module.is_valid());
    assert_eq!(module.descriptor().full_name(), "test.Module");
    let a = field(Module::static_descriptor(), "a");
    assert!(!module.has(a).unwrap());
    assert_eq!(module.get(a).unwrap().as_u64(), Some(0));
    assert!(module.get_unknown().is_empty());

    let children = view
        .get(field(Tree::static_descriptor(), "children"))
        .unwrap()
        .as_list()
        .unwrap();
    assert!(children.is_empty());
    assert_eq!(children.element_descriptor().full_name(), "test.Tree");
}

#[test]
fn foreign_and_extension_fields_are_rejected() {
    let span = Span::default();
    let view = span.view();
    // Same number as Span's `nanos`, but a different field.
    let foreign = field(Module::static_descriptor(), "a");
    assert_eq!(
        view.has(foreign).unwrap_err().kind(),
        ReflectErrorKind::UnknownField
    );
    let extension =
        FieldDescriptor::extension(100, "test.ext", LogicalKind::Scalar(ScalarKind::Uint64));
    let err = view.get(&extension).unwrap_err();
    assert_eq!(err.kind(), ReflectErrorKind::ExtensionsUnsupported);
    assert_eq!(err.subject(), "test.ext");
}

#[test]
fn range_visits_populated_fields_in_order() {
    let module = Module {
        duration: Some(Span::default()),
        a: 1,
        c: 3,
        ..Default::default()
    };
    let mut seen = Vec::new();
    module.view().range(|field, _| {
        seen.push(field.name());
        true
    });
    assert_eq!(seen, ["duration", "a", "c"]);

    let mut seen = Vec::new();
    module.view().range(|field, value| {
        seen.push((field.number(), value.as_u64()));
        seen.len() < 2
    });
    assert_eq!(seen, [(1, None), (2, Some(1))]);
}

#[test]
fn unknown_bytes_through_reflection() {
    let mut module = Module {
        a: 1,
        ..Default::default()
    };
    module.reflect().set_unknown(vec![0x28, 0x07]);
    assert_eq!(module.reflect().get_unknown(), [0x28, 0x07]);
    assert_eq!(module.encode_to_vec(), [0x10, 0x01, 0x28, 0x07]);
}

#[test]
fn new_field_values() {
    let descriptor = Tree::static_descriptor();
    let mut tree = Tree::default();
    let reflect = tree.reflect();
    assert!(matches!(
        reflect.new_field(field(descriptor, "delta")),
        Ok(Value::Int32(0))
    ));
    assert!(matches!(
        reflect.new_field(field(descriptor, "children")),
        Ok(Value::List(list)) if list.is_empty()
    ));
    match reflect.new_field(field(descriptor, "module")) {
        Ok(Value::Message(record)) => assert_eq!(
            record.downcast_ref::<Module>(),
            Some(&Module::default())
        ),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn list_adapter() {
    let descriptor = Tree::static_descriptor();
    let name = field(descriptor, "name");
    let named = |text: &str| Tree {
        name: text.into(),
        ..Default::default()
    };
    let mut tree = Tree::default();
    {
        let mut reflect = tree.reflect();
        let mut list = reflect
            .mutable(field(descriptor, "children"))
            .unwrap()
            .into_list()
            .unwrap();
        assert!(list.is_empty());
        assert_eq!(list.field().name(), "children");
        list.append(Value::message(named("a"))).unwrap();
        list.append_mutable().set(name, Value::from("b")).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().get(name).unwrap().as_str(), Some("b"));
        list.get_mut(1).unwrap().set(name, Value::from("B")).unwrap();
        list.set(0, Value::message(named("c"))).unwrap();
        assert_eq!(
            list.as_list_ref()
                .iter()
                .map(|child| child.downcast_ref::<Tree>().unwrap().name.clone())
                .collect::<Vec<_>>(),
            ["c", "B"]
        );

        assert_eq!(
            list.get(2).unwrap_err().kind(),
            ReflectErrorKind::IndexOutOfRange
        );
        assert_eq!(
            list.set(2, Value::message(named("x"))).unwrap_err().kind(),
            ReflectErrorKind::IndexOutOfRange
        );
        assert_eq!(
            list.append(Value::message(Module::default()))
                .unwrap_err()
                .kind(),
            ReflectErrorKind::TypeMismatch
        );
        assert_eq!(
            list.append(Value::from(1u64)).unwrap_err().kind(),
            ReflectErrorKind::TypeMismatch
        );
        match list.new_element() {
            Value::Message(record) => assert!(record.downcast_ref::<Tree>().is_some()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(list.len(), 2);

        assert_eq!(
            list.truncate(3).unwrap_err().kind(),
            ReflectErrorKind::IndexOutOfRange
        );
        list.truncate(1).unwrap();
    }
    assert_eq!(tree.children, [named("c")]);

    let view = tree.view();
    let children = view.get(field(descriptor, "children")).unwrap().as_list().unwrap();
    assert!(children.is_valid());
    assert_eq!(children.len(), 1);
    assert_eq!(children.get(0).unwrap().get(name).unwrap().as_str(), Some("c"));
    assert!(children.get(1).is_err());
}

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "test.Duration")]
struct Impostor {
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

#[test]
fn registry_collects_reachable_types() {
    let mut builder = Registry::builder();
    builder.register::<Tree>().unwrap();
    // Registering twice is harmless.
    builder.register::<Module>().unwrap();
    let registry = builder.build();

    assert_eq!(registry.len(), 3);
    for name in ["test.Tree", "test.Module", "test.Duration"] {
        assert!(registry.contains(name), "{} missing", name);
        assert_eq!(registry.descriptor(name).unwrap().full_name(), name);
    }
    assert!(!registry.contains("test.Missing"));

    let record = registry.new_record("test.Module").unwrap();
    assert_eq!(record.downcast_ref::<Module>(), Some(&Module::default()));

    let mut builder = Registry::builder();
    builder.register::<Module>().unwrap();
    assert_eq!(
        builder.register::<Impostor>().unwrap_err(),
        DescriptorError::ConflictingMessage {
            message: "test.Duration".into()
        }
    );
}

#[test]
fn decode_dynamically_typed_records() {
    let mut builder = Registry::builder();
    builder.register::<Module>().unwrap();
    let registry = builder.build();

    let mut record = registry.new_record("test.Module").unwrap();
    crate::unmarshal_into(&mut *record, &[0x20, 0x09], &DecodeOptions::default()).unwrap();
    assert_eq!(crate::size(&*record), 2);
    assert_eq!(crate::marshal(&*record), [0x20, 0x09]);
    let c = field(Module::static_descriptor(), "c");
    assert_eq!(crate::MessageView::new(&*record).get(c).unwrap().as_u64(), Some(9));
}

#[test]
fn rejecting_unknown_fields() {
    let module = Module::static_descriptor();
    assert_eq!(reject_unknown_fields(&[0x10, 0x07], module, false, None), Ok(false));

    let err = reject_unknown_fields(&[0x10, 0x07, 0x28, 0x01], module, false, None).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::UnknownField { number: 5 });
    assert_eq!(err.offset(), 2);

    let mut non_critical = vec![0x10, 0x07];
    RawValue::Varint(1).encode(crate::encoding::unknown::NON_CRITICAL_BIT | 5, &mut non_critical);
    assert_eq!(reject_unknown_fields(&non_critical, module, true, None), Ok(true));
    assert!(reject_unknown_fields(&non_critical, module, false, None).is_err());

    // Unknown fields inside nested records are found too.
    let tree = Tree {
        module: Some(Module {
            unknown_fields: vec![0x28, 0x01],
            ..Default::default()
        }),
        ..Default::default()
    };
    let encoded = tree.encode_to_vec();
    let err = reject_unknown_fields(&encoded, Tree::static_descriptor(), false, None).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::UnknownField { number: 5 });
    assert_eq!(err.offset(), 2);
    #[cfg(feature = "detailed-errors")]
    assert_eq!(err.path(), [("test.Tree", "module")]);
}

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "google.protobuf.Any")]
struct Packed {
    type_url: String,
    value: Vec<u8>,
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Record)]
#[reflect(name = "test.Envelope")]
struct Envelope {
    packed: Option<Packed>,
    #[reflect(unknown_fields)]
    unknown_fields: Vec<u8>,
}

fn envelope_of(type_url: &str, module: Module) -> Vec<u8> {
    Envelope {
        packed: Some(Packed {
            type_url: type_url.into(),
            value: module.encode_to_vec(),
            ..Default::default()
        }),
        ..Default::default()
    }
    .encode_to_vec()
}

#[test]
fn rejecting_unknown_fields_inside_any() {
    let mut builder = Registry::builder();
    builder.register::<Module>().unwrap();
    let registry = builder.build();
    let envelope = Envelope::static_descriptor();

    let clean = envelope_of(
        "/test.Module",
        Module {
            a: 1,
            ..Default::default()
        },
    );
    assert_eq!(
        reject_unknown_fields(&clean, envelope, false, Some(&registry)),
        Ok(false)
    );

    let hidden = envelope_of(
        "type.example.com/test.Module",
        Module {
            a: 1,
            unknown_fields: vec![0x28, 0x01],
            ..Default::default()
        },
    );
    // Without a registry the packed bytes are opaque.
    assert_eq!(reject_unknown_fields(&hidden, envelope, false, None), Ok(false));
    let err = reject_unknown_fields(&hidden, envelope, false, Some(&registry)).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::UnknownField { number: 5 });
    // envelope key and length, url key and length, 28 url bytes, value key and length, a = 1
    assert_eq!(err.offset(), 2 + 2 + 28 + 2 + 2);
    #[cfg(feature = "detailed-errors")]
    assert_eq!(
        err.path(),
        [("google.protobuf.Any", "value"), ("test.Envelope", "packed")]
    );

    let mut non_critical = Module::default();
    RawValue::Varint(1).encode(
        crate::encoding::unknown::NON_CRITICAL_BIT | 5,
        &mut non_critical.unknown_fields,
    );
    let non_critical = envelope_of("/test.Module", non_critical);
    assert_eq!(
        reject_unknown_fields(&non_critical, envelope, true, Some(&registry)),
        Ok(true)
    );

    let unresolved = envelope_of("/test.Missing", Module::default());
    let err = reject_unknown_fields(&unresolved, envelope, false, Some(&registry)).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::UnresolvedAnyType);
    assert_eq!(err.offset(), 2);

    // The envelope itself is always checked.
    let mut tampered = Envelope {
        packed: Some(Packed {
            type_url: "/test.Module".into(),
            unknown_fields: vec![0x18, 0x01],
            ..Default::default()
        }),
        ..Default::default()
    }
    .encode_to_vec();
    let err = reject_unknown_fields(&tampered, envelope, false, None).unwrap_err();
    assert_eq!(err.kind(), DecodeErrorKind::UnknownField { number: 3 });
    tampered.truncate(tampered.len() - 2);
    tampered[1] -= 2;
    assert_eq!(
        reject_unknown_fields(&tampered, envelope, false, Some(&registry)),
        Ok(false)
    );
}
