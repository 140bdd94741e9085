//! Streaming binary STL writer.
//!
//! Triangles are queued onto a bounded channel and written by a dedicated
//! worker thread; the channel provides natural back-pressure since the writer
//! owns the one physical file. Closing the writer flushes, seeks back to the
//! count field at byte 80, and rewrites it. An aborted run therefore leaves a
//! zero count behind, which is a detectable invalid STL.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

const HEADER_SIZE: u64 = 80;
const QUEUE_DEPTH: usize = 10_000;

/// An STL triangle: normal plus three vertices.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Tri {
    pub n: [f32; 3],
    pub v1: [f32; 3],
    pub v2: [f32; 3],
    pub v3: [f32; 3],
}

/// A streaming binary STL file writer.
pub struct StlWriter {
    tx: SyncSender<Tri>,
    worker: JoinHandle<io::Result<u32>>,
}

impl StlWriter {
    /// Creates the file, writes the placeholder header, and starts the
    /// writer worker.
    pub fn create(filename: &str) -> io::Result<Self> {
        let file = File::create(filename)?;
        Self::start(file)
    }

    fn start<W: Write + Seek + Send + 'static>(mut out: W) -> io::Result<Self> {
        out.write_all(&[0u8; HEADER_SIZE as usize])?;
        out.write_all(&0u32.to_le_bytes())?; // count, rewritten on close

        let (tx, rx) = mpsc::sync_channel::<Tri>(QUEUE_DEPTH);
        let worker = std::thread::spawn(move || write_loop(out, rx));
        Ok(Self { tx, worker })
    }

    /// Queues one triangle for writing.
    pub fn write(&self, t: Tri) -> io::Result<()> {
        self.tx
            .send(t)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "triangle writer terminated"))
    }

    /// Finalizes the STL file and returns the triangle count.
    pub fn close(self) -> io::Result<u32> {
        let Self { tx, worker } = self;
        drop(tx);
        match worker.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("triangle writer panicked")),
        }
    }
}

fn write_loop<W: Write + Seek>(out: W, rx: Receiver<Tri>) -> io::Result<u32> {
    let mut w = BufWriter::new(out);
    let mut count = 0u32;

    for t in rx {
        w.write_all(bytemuck::cast_slice(&t.n))?;
        w.write_all(bytemuck::cast_slice(&t.v1))?;
        w.write_all(bytemuck::cast_slice(&t.v2))?;
        w.write_all(bytemuck::cast_slice(&t.v3))?;
        w.write_all(&0u16.to_le_bytes())?;
        count += 1;
    }

    w.seek(SeekFrom::Start(HEADER_SIZE))?;
    w.write_all(&count.to_le_bytes())?;
    w.flush()?;
    Ok(count)
}

#[cfg(test)]
pub(crate) fn temp_path(tag: &str) -> String {
    std::env::temp_dir()
        .join(format!("irmf-stl-{tag}-{}.stl", std::process::id()))
        .to_string_lossy()
        .into_owned()
}
