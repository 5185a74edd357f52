use std::{
    fs,
    io::{self, BufRead, BufReader, Read},
    path::PathBuf,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use xz2::read::XzDecoder;

use crate::error::TraceError;

/// One memory reference: `<type> <hex address> [<time>]`.
///
/// The type character is kept as written; the hierarchy decides whether it is
/// a valid access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ref {
    pub kind: char,
    pub address: u64,
    pub time: Option<u64>,
    pub line: usize,
}

pub fn parse_line(line: usize, text: &str) -> Result<Option<Ref>, TraceError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }
    let err = |reason: String| TraceError::Parse { line, reason };

    let mut fields = text.split_whitespace();
    let kind_field = fields.next().unwrap_or_default();
    let mut kind_chars = kind_field.chars();
    let kind = match (kind_chars.next(), kind_chars.next()) {
        (Some(c), None) => c,
        _ => return Err(err(format!("access type {kind_field:?} is not one character"))),
    };

    let addr_field = fields
        .next()
        .ok_or_else(|| err("missing address".to_owned()))?;
    let digits = addr_field
        .strip_prefix("0x")
        .or_else(|| addr_field.strip_prefix("0X"))
        .unwrap_or(addr_field);
    let address = u64::from_str_radix(digits, 16)
        .map_err(|e| err(format!("bad address {addr_field:?}: {e}")))?;

    let time = fields
        .next()
        .map(|t| {
            t.parse::<u64>()
                .map_err(|e| err(format!("bad time {t:?}: {e}")))
        })
        .transpose()?;

    if let Some(extra) = fields.next() {
        return Err(err(format!("unexpected field {extra:?}")));
    }

    Ok(Some(Ref {
        kind,
        address,
        time,
        line,
    }))
}

pub type RefBlock = Result<Vec<Ref>, TraceError>;

/// Trace file decoded on a background thread and handed over in blocks.
/// The channel closes after the last block or after the first error.
pub struct Trace {
    pub rec: Receiver<RefBlock>,
    _thread: JoinHandle<()>,
}

impl Trace {
    /// Opens `path`, decompressing it if the name ends in `.xz`.
    pub fn read(path: PathBuf, refs_per_block: usize, blocks_per_queue: usize) -> io::Result<Trace> {
        let stream = fs::File::open(&path)?;
        let compressed = path.extension().is_some_and(|ext| ext == "xz");
        Ok(if compressed {
            Trace::from_reader(XzDecoder::new(stream), refs_per_block, blocks_per_queue)
        } else {
            Trace::from_reader(stream, refs_per_block, blocks_per_queue)
        })
    }

    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        refs_per_block: usize,
        blocks_per_queue: usize,
    ) -> Trace {
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);
        let refs_per_block = refs_per_block.max(1);
        let t = thread::spawn(move || {
            Trace::run_thread(BufReader::new(reader), refs_per_block, sender)
        });

        Trace {
            rec: receiver,
            _thread: t,
        }
    }

    fn run_thread(reader: impl BufRead, refs_per_block: usize, queue: Sender<RefBlock>) {
        let mut buffer = Vec::with_capacity(refs_per_block);
        for (idx, line) in reader.lines().enumerate() {
            let parsed = line
                .map_err(TraceError::from)
                .and_then(|text| parse_line(idx + 1, &text));
            match parsed {
                Ok(Some(r)) => buffer.push(r),
                Ok(None) => continue,
                Err(err) => {
                    if !buffer.is_empty() {
                        let _ = queue.send(Ok(std::mem::take(&mut buffer)));
                    }
                    let _ = queue.send(Err(err));
                    return;
                }
            }

            if buffer.len() == refs_per_block {
                let full = std::mem::replace(&mut buffer, Vec::with_capacity(refs_per_block));
                if queue.send(Ok(full)).is_err() {
                    // Receiver hung up
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            let _ = queue.send(Ok(buffer));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use xz2::write::XzEncoder;

    use super::*;

    const SAMPLE: &str = "\
# kind address time
r 0x1000 0
w 1fe0 3

R 0XABC
";

    fn collect(trace: Trace) -> Result<Vec<Ref>, TraceError> {
        let mut refs = Vec::new();
        for block in trace.rec.iter() {
            refs.extend(block?);
        }
        Ok(refs)
    }

    #[test]
    fn parses_fields() {
        assert_eq!(
            parse_line(4, "w 0x20 17").unwrap(),
            Some(Ref {
                kind: 'w',
                address: 0x20,
                time: Some(17),
                line: 4
            })
        );
        assert_eq!(parse_line(1, "  r ff  ").unwrap().unwrap().address, 0xff);
        assert_eq!(parse_line(1, "r ff").unwrap().unwrap().time, None);
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert_eq!(parse_line(1, "").unwrap(), None);
        assert_eq!(parse_line(2, "   ").unwrap(), None);
        assert_eq!(parse_line(3, "# r 0x10").unwrap(), None);
    }

    #[test]
    fn keeps_unknown_type_for_the_hierarchy() {
        assert_eq!(parse_line(1, "x 0x10").unwrap().unwrap().kind, 'x');
    }

    #[test]
    fn rejects_malformed_lines() {
        for bad in ["r", "rw 0x10", "r 0xzz", "r 10 -1", "r 10 5 extra"] {
            match parse_line(9, bad) {
                Err(TraceError::Parse { line: 9, .. }) => {}
                other => panic!("{bad:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn reads_in_blocks() {
        let trace = Trace::from_reader(Cursor::new(SAMPLE), 2, 1);
        let blocks: Vec<_> = trace.rec.iter().map(|b| b.unwrap().len()).collect();
        assert_eq!(blocks, vec![2, 1]);
    }

    #[test]
    fn stops_at_first_bad_line() {
        let text = "r 0x0\nw 0x20\nr nope\nr 0x40\n";
        let trace = Trace::from_reader(Cursor::new(text), 16, 4);
        let blocks: Vec<_> = trace.rec.iter().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].as_ref().unwrap().len(), 2);
        assert!(matches!(blocks[1], Err(TraceError::Parse { line: 3, .. })));
    }

    #[test]
    fn decodes_xz() {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let refs = collect(Trace::from_reader(
            XzDecoder::new(Cursor::new(compressed)),
            16,
            4,
        ))
        .unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[1].address, 0x1fe0);
        assert_eq!(refs[2].kind, 'R');
        assert_eq!(refs[2].line, 5);
    }

    #[test]
    fn opens_files_by_extension() {
        let dir = std::env::temp_dir().join(format!("cachesim-trace-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let plain = dir.join("t.txt");
        fs::write(&plain, SAMPLE).unwrap();
        let packed = dir.join("t.xz");
        let mut encoder = XzEncoder::new(fs::File::create(&packed).unwrap(), 6);
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        for path in [plain, packed] {
            let refs = collect(Trace::read(path, 8, 2).unwrap()).unwrap();
            assert_eq!(refs.len(), 3);
            assert_eq!(refs[0].time, Some(0));
        }
        fs::remove_dir_all(&dir).unwrap();
    }
}
