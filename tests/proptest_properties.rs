// Property tests: chunking invariance, decode correctness for generated
// deltas, and safety on arbitrary input.

use proptest::prelude::*;
use vcdec::decoder::{StreamingDecoder, decode};
use vcdec::varint;

const VCD_SOURCE: u8 = 0x01;
const VCD_CHECKSUM: u8 = 0x04;

fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + u32::from(byte)) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

fn window(
    win_ind: u8,
    seg: Option<(u32, u32)>,
    tws: u32,
    data: &[u8],
    inst: &[u8],
    addr: &[u8],
    checksum: Option<u64>,
) -> Vec<u8> {
    let mut tail = Vec::new();
    varint::write_u32(&mut tail, tws).unwrap();
    tail.push(0);
    varint::write_u32(&mut tail, data.len() as u32).unwrap();
    varint::write_u32(&mut tail, inst.len() as u32).unwrap();
    varint::write_u32(&mut tail, addr.len() as u32).unwrap();
    if let Some(ck) = checksum {
        varint::write_u64(&mut tail, ck).unwrap();
    }
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

/// One interleaved 'S' window that ADDs the whole target, with checksum.
fn interleaved_add_delta(target: &[u8]) -> Vec<u8> {
    let mut inst = vec![0x01];
    varint::write_u32(&mut inst, target.len() as u32).unwrap();
    inst.extend_from_slice(target);

    let mut delta = vec![0xD6, 0xC3, 0xC4, b'S', 0x00];
    delta.extend(window(
        VCD_CHECKSUM,
        None,
        target.len() as u32,
        &[],
        &inst,
        &[],
        Some(u64::from(adler32(target))),
    ));
    delta
}

proptest! {
    #[test]
    fn prop_chunking_invariance(
        target in proptest::collection::vec(any::<u8>(), 1..512),
        cuts in proptest::collection::vec(1usize..64, 0..16),
    ) {
        let delta = interleaved_add_delta(&target);
        prop_assert_eq!(&decode(b"", &delta).unwrap(), &target);

        // The same delta, delivered in arbitrary pieces.
        let mut decoder = StreamingDecoder::new();
        decoder.start(b"").unwrap();
        let mut out = Vec::new();
        let mut pos = 0;
        for cut in cuts {
            let end = (pos + cut).min(delta.len());
            decoder.decode_chunk(&delta[pos..end], &mut out).unwrap();
            pos = end;
        }
        decoder.decode_chunk(&delta[pos..], &mut out).unwrap();
        decoder.finish().unwrap();
        prop_assert_eq!(&out, &target);
    }

    #[test]
    fn prop_copy_then_add_roundtrip(
        dict in proptest::collection::vec(any::<u8>(), 4..256),
        extra in proptest::collection::vec(any::<u8>(), 1..128),
        n in 1usize..64,
    ) {
        // COPY an n-byte dictionary prefix, then ADD `extra`.
        let n = n.min(dict.len());
        let mut inst = vec![0x13];
        varint::write_u32(&mut inst, n as u32).unwrap();
        inst.push(0x01);
        varint::write_u32(&mut inst, extra.len() as u32).unwrap();

        let mut delta = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
        delta.extend(window(
            VCD_SOURCE,
            Some((dict.len() as u32, 0)),
            (n + extra.len()) as u32,
            &extra,
            &inst,
            &[0x00],
            None,
        ));

        let mut expected = dict[..n].to_vec();
        expected.extend_from_slice(&extra);
        prop_assert_eq!(decode(&dict, &delta).unwrap(), expected);
    }

    #[test]
    fn prop_arbitrary_input_is_safe(
        data in proptest::collection::vec(any::<u8>(), 0..256),
        dict in proptest::collection::vec(any::<u8>(), 0..64),
        chunk_len in 1usize..32,
    ) {
        const LIMIT: usize = 1 << 16;
        let mut decoder = StreamingDecoder::new();
        decoder.set_maximum_target_file_size(LIMIT).unwrap();
        decoder.start(&dict).unwrap();
        let mut out = Vec::new();
        let mut ok = true;
        for chunk in data.chunks(chunk_len) {
            if decoder.decode_chunk(chunk, &mut out).is_err() {
                ok = false;
                break;
            }
        }
        if ok {
            let _ = decoder.finish();
        }
        prop_assert!(out.len() <= LIMIT);
    }

    #[test]
    fn prop_varint_u31_roundtrip(val in 0u32..=0x7FFF_FFFF) {
        let mut encoded = Vec::new();
        varint::write_u32(&mut encoded, val).unwrap();
        let (decoded, consumed) = varint::read_u31(&encoded).unwrap();
        prop_assert_eq!(decoded, val);
        prop_assert_eq!(consumed, encoded.len());
        prop_assert_eq!(consumed, varint::sizeof_u32(val));
    }
}
