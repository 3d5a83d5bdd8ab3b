use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use gal::{
    BindGroupBuilder, BindGroupLayoutDesc, BufferDesc, BufferRange, Device, GalContext,
    GalSettings, GraphicsPipelineDesc, HashedGraphicsPipelineDesc, ShaderDesc,
    ShaderResourceBinding, ShaderResourceType, ShaderTextureType, TextureDesc, TextureRange,
};
use gal_dev_utils::RecordingDevice;

fn bench_bind_group_builder(c: &mut Criterion) {
    let device = Arc::new(RecordingDevice::new());
    let ctx = GalContext::initialize(device.clone(), Some(device.clone()), GalSettings::default())
        .expect("context");
    let layout = ctx
        .create_bind_group_layout(BindGroupLayoutDesc::new(vec![
            ShaderResourceBinding::new("Material", ShaderResourceType::ConstantBuffer, 0, 0),
            ShaderResourceBinding::new("Albedo", ShaderResourceType::Texture, 0, 1)
                .with_texture_type(ShaderTextureType::Texture2D),
            ShaderResourceBinding::new("Normal", ShaderResourceType::Texture, 0, 2)
                .with_texture_type(ShaderTextureType::Texture2D),
            ShaderResourceBinding::new("ShadowMap", ShaderResourceType::Texture, 0, 3)
                .with_texture_type(ShaderTextureType::Texture2DArray),
            ShaderResourceBinding::new("LinearSampler", ShaderResourceType::Sampler, 0, 4),
        ]))
        .expect("layout");
    let material = device
        .create_buffer(&BufferDesc::constant(256))
        .expect("buffer");
    let albedo = device
        .create_texture(&TextureDesc::new_2d(
            256,
            256,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ))
        .expect("texture");

    let mut builder = BindGroupBuilder::new();
    builder.reset_bound_resources(&ctx);
    builder.bind_buffer("Material", material, BufferRange::whole(), None);
    builder.bind_texture("Albedo", albedo, TextureRange::whole(), None);

    let mut group = c.benchmark_group("bind_group_builder");
    group.throughput(criterion::Throughput::Elements(1));
    group.bench_function("create_bind_group", |b| {
        b.iter(|| black_box(builder.create_bind_group(layout).expect("desc")));
    });
    group.bench_function("bind_texture (unchanged)", |b| {
        b.iter(|| builder.bind_texture("Albedo", black_box(albedo), TextureRange::whole(), None));
    });
    group.finish();

    ctx.shutdown();
}

fn bench_pipeline_cache(c: &mut Criterion) {
    let device = Arc::new(RecordingDevice::new());
    let ctx = GalContext::initialize(device.clone(), Some(device.clone()), GalSettings::default())
        .expect("context");
    let shader = device
        .create_shader(&ShaderDesc {
            name: "forward".to_owned(),
            ..ShaderDesc::default()
        })
        .expect("shader");
    let cache = ctx.pipeline_cache().expect("pipeline cache");
    let desc = GraphicsPipelineDesc::new(shader);
    cache.get_graphics_pipeline(&desc).expect("pipeline");

    let mut group = c.benchmark_group("pipeline_cache");
    group.throughput(criterion::Throughput::Elements(1));
    group.bench_function("get_graphics_pipeline (hit)", |b| {
        b.iter(|| black_box(cache.get_graphics_pipeline(black_box(&desc)).expect("pipeline")));
    });
    let hashed = HashedGraphicsPipelineDesc::new(desc.clone());
    group.bench_function("get_graphics_pipeline_hashed (hit)", |b| {
        b.iter(|| {
            black_box(
                cache
                    .get_graphics_pipeline_hashed(black_box(&hashed))
                    .expect("pipeline"),
            )
        });
    });
    group.finish();

    ctx.shutdown();
}

criterion_group!(benches, bench_bind_group_builder, bench_pipeline_cache);
criterion_main!(benches);
