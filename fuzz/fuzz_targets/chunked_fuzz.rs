#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdec::decoder::{StreamingDecoder, decode};

// Chunked delivery must agree with one-shot decoding: same output when
// both succeed, and an error in one means an error in the other.

fuzz_target!(|input: (u8, &[u8])| {
    let (chunk_seed, data) = input;
    let chunk_len = usize::from(chunk_seed % 16) + 1;

    let one_shot = decode(b"fuzz dictionary", data);

    let mut decoder = StreamingDecoder::new();
    decoder.start(b"fuzz dictionary").unwrap();
    let mut out = Vec::new();
    let mut chunked: Result<(), _> = Ok(());
    for chunk in data.chunks(chunk_len) {
        if let Err(e) = decoder.decode_chunk(chunk, &mut out) {
            chunked = Err(e);
            break;
        }
    }
    if chunked.is_ok() {
        chunked = decoder.finish();
    }

    match (one_shot, chunked) {
        (Ok(expected), Ok(())) => assert_eq!(expected, out),
        (Err(_), Err(_)) => {}
        (Ok(_), Err(e)) => panic!("chunked failed where one-shot succeeded: {e}"),
        (Err(e), Ok(())) => panic!("one-shot failed where chunked succeeded: {e}"),
    }
});
