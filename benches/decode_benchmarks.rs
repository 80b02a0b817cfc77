use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vcdec::decoder::{StreamingDecoder, decode};
use vcdec::varint;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn window(
    win_ind: u8,
    seg: Option<(u32, u32)>,
    tws: u32,
    data: &[u8],
    inst: &[u8],
    addr: &[u8],
) -> Vec<u8> {
    let mut tail = Vec::new();
    varint::write_u32(&mut tail, tws).unwrap();
    tail.push(0);
    varint::write_u32(&mut tail, data.len() as u32).unwrap();
    varint::write_u32(&mut tail, inst.len() as u32).unwrap();
    varint::write_u32(&mut tail, addr.len() as u32).unwrap();
    let enc_len = (tail.len() + data.len() + inst.len() + addr.len()) as u32;

    let mut out = vec![win_ind];
    if let Some((len, pos)) = seg {
        varint::write_u32(&mut out, len).unwrap();
        varint::write_u32(&mut out, pos).unwrap();
    }
    varint::write_u32(&mut out, enc_len).unwrap();
    out.extend_from_slice(&tail);
    out.extend_from_slice(data);
    out.extend_from_slice(inst);
    out.extend_from_slice(addr);
    out
}

/// ADD-heavy delta: windows of literal data, standard section layout.
fn add_delta(target: &[u8], window_size: usize) -> Vec<u8> {
    let mut delta = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
    for chunk in target.chunks(window_size) {
        let mut inst = vec![0x01];
        varint::write_u32(&mut inst, chunk.len() as u32).unwrap();
        delta.extend(window(0, None, chunk.len() as u32, chunk, &inst, &[]));
    }
    delta
}

/// COPY-heavy delta: reconstruct the dictionary in fixed-size pieces.
fn copy_delta(dict_len: usize, piece: usize) -> Vec<u8> {
    let mut delta = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
    let mut pos = 0;
    while pos < dict_len {
        let n = piece.min(dict_len - pos);
        let mut inst = vec![0x13];
        varint::write_u32(&mut inst, n as u32).unwrap();
        let mut addr = Vec::new();
        varint::write_u32(&mut addr, pos as u32).unwrap();
        delta.extend(window(
            0x01, // VCD_SOURCE
            Some((dict_len as u32, 0)),
            n as u32,
            &[],
            &inst,
            &addr,
        ));
        pos += n;
    }
    delta
}

/// Interleaved 'S' delta mixing COPY and ADD per window.
fn interleaved_delta(dict: &[u8], target: &[u8], window_size: usize) -> Vec<u8> {
    let mut delta = vec![0xD6, 0xC3, 0xC4, b'S', 0x00];
    let copy_n = (dict.len() / 2).min(window_size / 2).max(1);
    for chunk in target.chunks(window_size.saturating_sub(copy_n).max(1)) {
        let mut inst = vec![0x13];
        varint::write_u32(&mut inst, copy_n as u32).unwrap();
        inst.push(0x00); // address 0
        inst.push(0x01);
        varint::write_u32(&mut inst, chunk.len() as u32).unwrap();
        inst.extend_from_slice(chunk);
        delta.extend(window(
            0x01,
            Some((dict.len() as u32, 0)),
            (copy_n + chunk.len()) as u32,
            &[],
            &inst,
            &[],
        ));
    }
    delta
}

fn bench_decode_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("decode_speed_mb_s");
    let target = gen_data(4 * 1024 * 1024, 42);
    let dict = gen_data(64 * 1024, 7);

    let workloads: Vec<(&str, Vec<u8>, Vec<u8>)> = vec![
        ("add_heavy", Vec::new(), add_delta(&target, 1 << 16)),
        ("copy_heavy", gen_data(4 * 1024 * 1024, 9), copy_delta(4 * 1024 * 1024, 1 << 16)),
        ("interleaved", dict.clone(), interleaved_delta(&dict, &target, 1 << 16)),
    ];

    for (name, source, delta) in &workloads {
        let decoded = decode(source, delta).unwrap();
        g.throughput(Throughput::Bytes(decoded.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(name), delta, |b, delta| {
            b.iter(|| {
                let out = decode(black_box(source), black_box(delta)).unwrap();
                black_box(out)
            })
        });
    }
    g.finish();
}

fn bench_chunked_decode(c: &mut Criterion) {
    let mut g = c.benchmark_group("chunked_decode_mb_s");
    let dict = gen_data(64 * 1024, 7);
    let target = gen_data(4 * 1024 * 1024, 42);
    let delta = interleaved_delta(&dict, &target, 1 << 16);
    let decoded = decode(&dict, &delta).unwrap();

    for chunk_len in [64usize, 4096, 1 << 20] {
        g.throughput(Throughput::Bytes(decoded.len() as u64));
        g.bench_with_input(
            BenchmarkId::from_parameter(chunk_len),
            &chunk_len,
            |b, &chunk_len| {
                b.iter(|| {
                    let mut decoder = StreamingDecoder::new();
                    decoder.start(&dict).unwrap();
                    let mut out = Vec::with_capacity(decoded.len());
                    for chunk in delta.chunks(chunk_len) {
                        decoder.decode_chunk(black_box(chunk), &mut out).unwrap();
                    }
                    decoder.finish().unwrap();
                    black_box(out)
                })
            },
        );
    }
    g.finish();
}

criterion_group!(benches, bench_decode_speed, bench_chunked_decode);
criterion_main!(benches);
