//! Stream utilities shared by the compactor and the collection read path:
//! an NDJSON line splitter over a raw byte buffer, and a bounded-parallelism
//! fan-out helper for concurrent blob fetches.
use futures::future::join_all;
use std::future::Future;

/// One decoded line of an NDJSON blob together with its byte span in the
/// buffer it came from (used to build `C.idx`, see the index-unit open
/// question resolved in `SPEC_FULL.md`).
pub struct Line<'a> {
    /// The raw bytes of the line, without the trailing newline.
    pub bytes: &'a [u8],
    /// Byte offset of the first byte of the line within the buffer.
    pub offset: usize,
    /// Length of the line in bytes, not including the trailing newline.
    pub length: usize,
}

/// Splits `buf` into non-empty NDJSON lines, yielding each line's bytes and
/// its byte offset/length within `buf`. Blank lines (consecutive or
/// trailing newlines) are skipped.
pub fn split_lines(buf: &[u8]) -> impl Iterator<Item = Line<'_>> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        while offset < buf.len() {
            let rest = &buf[offset..];
            let newline_at = rest.iter().position(|&b| b == b'\n');
            let (line, advance) = match newline_at {
                Some(pos) => (&rest[..pos], pos + 1),
                None => (rest, rest.len()),
            };
            let line_offset = offset;
            offset += advance;
            if !line.is_empty() {
                return Some(Line {
                    bytes: line,
                    offset: line_offset,
                    length: line.len(),
                });
            }
        }
        None
    })
}

/// Runs `make_future(item)` for every item in `items` with at most
/// `parallelism` futures in flight at once, returning results in the same
/// order as `items`. Used for the compactor's concurrent mutation fetches
/// (§4.2) and the read path's chunked mutation fan-out (§4.6).
pub async fn bounded_for_each<T, F, Fut, O>(items: Vec<T>, parallelism: usize, make_future: F) -> Vec<O>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = O>,
{
    let parallelism = parallelism.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut iter = items.into_iter();
    loop {
        let batch: Vec<T> = (&mut iter).take(parallelism).collect();
        if batch.is_empty() {
            break;
        }
        let batch_results = join_all(batch.into_iter().map(|item| make_future(item))).await;
        results.extend(batch_results);
    }
    results
}
