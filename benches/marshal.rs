//! Marshaling benchmarks
//!
//! Measures argument encoding, decoding and full proxy round trips.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use typelib_marshal::interop::{marshal_args, unmarshal_args, MessageReader, Phase};
use typelib_marshal::{
    Guid, HResult, InterfaceDesc, LocalObject, MarshalConfig, MarshalContext, MemoryTypeLibrary,
    ObjectRef, ParamDesc, TypeDesc, TypeRef, UserType, Value, IDENTITY_SLOTS, IID_IUNKNOWN,
};

const IID_SHAPES: Guid = Guid::from_u128(0xBE7C_0001);
const HREF_POINT: TypeRef = TypeRef(1);

fn library(points: u32) -> MemoryTypeLibrary {
    let shapes = InterfaceDesc::new(IID_SHAPES, "IShapes")
        .extends(IID_IUNKNOWN)
        .method("Draw", vec![
            ParamDesc::input("label", TypeDesc::BStr),
            ParamDesc::input("origin", TypeDesc::UserDefined(HREF_POINT)),
            ParamDesc::input("points", TypeDesc::array(TypeDesc::I4, points)),
            ParamDesc::input("style", TypeDesc::Variant),
            ParamDesc::output("drawn", TypeDesc::ptr(TypeDesc::U4)),
        ]);
    MemoryTypeLibrary::standard()
        .with_user_type(HREF_POINT, UserType::Record { name: "POINT".into(), size: 8 })
        .with_interface(shapes)
}

fn draw_args(points: u32) -> Vec<Value> {
    vec![
        Value::bstr("polyline"),
        Value::Blob(vec![0; 8]),
        Value::Array((0..points as i32).map(Value::I4).collect()),
        Value::variant(Value::U4(0xFF00FF)),
        Value::ptr(Value::U4(0)),
    ]
}

fn shapes() -> ObjectRef {
    LocalObject::builder("shapes", IID_SHAPES)
        .method(|args| {
            let count = match &args[2] {
                Value::Array(items) => items.len() as u32,
                _ => 0,
            };
            args[4].set_pointee(Value::U4(count));
            HResult::S_OK
        })
        .build()
}

fn bench_marshal_args(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal_args");

    for points in [4u32, 64, 1024].iter() {
        let ctx = MarshalContext::local(Arc::new(library(*points)), MarshalConfig::default());
        let desc = ctx.library().resolve(&IID_SHAPES).unwrap();
        let method = &desc.methods[0];
        let args = draw_args(*points);

        group.bench_with_input(BenchmarkId::new("encode", points), points, |b, _| {
            let codec = ctx.codec();
            b.iter(|| {
                let mut out = ctx.stream();
                marshal_args(&codec, &mut out, method, black_box(&args), Phase::In).unwrap();
                black_box(out.into_bytes())
            });
        });

        let mut out = ctx.stream();
        marshal_args(&ctx.codec(), &mut out, method, &args, Phase::In).unwrap();
        let encoded = out.into_bytes();

        group.bench_with_input(BenchmarkId::new("decode", points), points, |b, _| {
            let codec = ctx.codec();
            b.iter(|| {
                let mut decoded = vec![Value::Empty; method.params.len()];
                let mut reader = MessageReader::new(black_box(&encoded));
                unmarshal_args(&codec, &mut reader, method, &mut decoded, Phase::In).unwrap();
                black_box(decoded)
            });
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    let points = 64;
    let ctx = MarshalContext::local(Arc::new(library(points)), MarshalConfig::default());
    let object = shapes();

    let loopback = ctx.connect(&object, &IID_SHAPES).unwrap();
    group.bench_function("loopback", |b| {
        let mut args = draw_args(points);
        b.iter(|| black_box(loopback.call(IDENTITY_SLOTS, &mut args)));
    });

    let threaded = ctx.connect_threaded(&object, &IID_SHAPES).unwrap();
    group.bench_function("threaded", |b| {
        let mut args = draw_args(points);
        b.iter(|| black_box(threaded.call(IDENTITY_SLOTS, &mut args)));
    });

    group.finish();
}

criterion_group!(benches, bench_marshal_args, bench_round_trip);
criterion_main!(benches);
