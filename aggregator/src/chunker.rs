use crate::codec::{self, ProxyRecord};
use crate::encoding::encode_base64;
use std::num::NonZeroUsize;

/// One rendered segment of the output list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub body: String,
    pub line_count: usize,
}

/// Re-encodes every record, one URI per line.
pub fn encode_lines(records: &[ProxyRecord]) -> Vec<String> {
    records.iter().map(codec::encode).collect()
}

/// Splits `lines` into groups of `chunk_size`, newline-joined. With
/// `base64_output` every chunk body is encoded on its own, so consumers decode
/// chunk by chunk. No lines produce no chunks.
pub fn build_chunks(lines: &[String], chunk_size: NonZeroUsize, base64_output: bool) -> Vec<Chunk> {
    lines
        .chunks(chunk_size.get())
        .map(|group| {
            let joined = group.join("\n");
            let body = if base64_output {
                encode_base64(&joined)
            } else {
                joined
            };

            Chunk {
                body,
                line_count: group.len(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode_base64_lenient;

    fn lines(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("vless://u@h{i}.test:443?sni=h{i}.test#v{i}"))
            .collect()
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_chunk_counts() {
        for (count, expected_total, expected_last) in [
            (0, 0, 0),
            (1, 1, 1),
            (399, 1, 399),
            (400, 1, 400),
            (401, 2, 1),
            (800, 2, 400),
            (801, 3, 1),
        ] {
            let chunks = build_chunks(&lines(count), size(400), false);
            assert_eq!(chunks.len(), expected_total, "{count} lines");
            assert_eq!(chunks.len(), count.div_ceil(400));
            if let Some(last) = chunks.last() {
                assert_eq!(last.line_count, expected_last);
                assert_eq!(last.body.lines().count(), expected_last);
            }
        }
    }

    #[test]
    fn test_order_preserved() {
        let input = lines(5);
        let chunks = build_chunks(&input, size(2), false);

        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.body.lines().map(String::from))
            .collect();
        assert_eq!(rejoined, input);
    }

    #[test]
    fn test_base64_per_chunk() {
        let input = lines(3);
        let chunks = build_chunks(&input, size(2), true);

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            decode_base64_lenient(&chunks[0].body).unwrap(),
            format!("{}\n{}", input[0], input[1])
        );
        assert_eq!(decode_base64_lenient(&chunks[1].body).unwrap(), input[2]);
        assert_eq!(chunks[1].line_count, 1);
    }
}
