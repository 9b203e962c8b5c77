//! Emulated coprocessor.
//!
//! [`EmulatedLink::spawn`] starts a service thread that owns the device
//! side of a [`SharedMemory`] pool. For each request it decodes the
//! parameter block from device memory, runs the primitive with the same
//! kernels the local backend uses and writes the outputs back before
//! replying. Any decoding or execution error is answered with a FAILED
//! reply.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;

use crate::backend::{scan, Window, WindowSet, WindowStats};
use crate::feature::PatchData;
use crate::fixed::Fixed;
use crate::image::{Axis, ImageView, IntegralImage, Plane};
use crate::offload::memory::SharedMemory;
use crate::offload::protocol::{
    decode_q15, decode_scalar, decode_u32s, decode_u64s, encode_q15, encode_scalar, encode_u32s,
    encode_u64s, param, patch_record_len, Message, Opcode, Status, PATCH_HEADER_WORDS,
};
use crate::offload::session::Link;
use crate::trace::trace_warn;
use crate::util::{CornerMatchError, CornerMatchResult};

/// [`Link`] to a coprocessor emulated on a background thread.
#[derive(Debug)]
pub struct EmulatedLink {
    requests: Option<Sender<Message>>,
    replies: Receiver<Message>,
    worker: Option<JoinHandle<()>>,
}

impl EmulatedLink {
    /// Starts the service thread on `memory`.
    pub fn spawn(memory: SharedMemory) -> CornerMatchResult<Self> {
        let (request_tx, request_rx) = channel::<Message>();
        let (reply_tx, reply_rx) = channel::<Message>();
        let firmware = Firmware { memory };
        let worker = std::thread::Builder::new()
            .name("cornermatch-firmware".into())
            .spawn(move || firmware.serve(request_rx, reply_tx))
            .map_err(|_| CornerMatchError::LinkClosed)?;
        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            worker: Some(worker),
        })
    }
}

impl Link for EmulatedLink {
    fn send(&mut self, message: Message) -> CornerMatchResult<()> {
        self.requests
            .as_ref()
            .ok_or(CornerMatchError::LinkClosed)?
            .send(message)
            .map_err(|_| CornerMatchError::LinkClosed)
    }

    fn recv(&mut self) -> CornerMatchResult<Message> {
        self.replies.recv().map_err(|_| CornerMatchError::LinkClosed)
    }
}

impl Drop for EmulatedLink {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                trace_warn!("firmware thread panicked");
            }
        }
    }
}

struct Firmware {
    memory: SharedMemory,
}

impl Firmware {
    fn serve(self, requests: Receiver<Message>, replies: Sender<Message>) {
        while let Ok(request) = requests.recv() {
            let (status, value) = match self.execute(request) {
                Ok(value) => (Status::Finished, value),
                Err(err) => {
                    trace_warn!("firmware opcode {} failed: {err}", request.opcode);
                    (Status::Failed, 0)
                }
            };
            if replies
                .send(Message::reply(request.opcode, status, value))
                .is_err()
            {
                break;
            }
            if request.kind() == Some(Opcode::Close) {
                break;
            }
        }
    }

    fn execute(&self, request: Message) -> CornerMatchResult<u32> {
        let opcode = request
            .kind()
            .ok_or(CornerMatchError::InvalidInput("unknown opcode"))?;
        match opcode {
            Opcode::Open | Opcode::Close => Ok(0),
            Opcode::Convolve => self.convolve(&self.params(request)?),
            Opcode::PatchStats => self.patch_stats(&self.params(request)?),
            Opcode::ImageData => self.image_data(&self.params(request)?),
            Opcode::NccArea => self.ncc_area(&self.params(request)?),
        }
    }

    fn params(&self, request: Message) -> CornerMatchResult<Vec<u32>> {
        let bytes = self
            .memory
            .device_read(request.arg1, 0, request.arg2 as usize * 4)?;
        Ok(decode_u32s(&bytes))
    }

    fn read_pixels(&self, addr: u32, width: usize, height: usize) -> CornerMatchResult<Vec<u8>> {
        self.memory.device_read(addr, 0, width * height)
    }

    fn convolve(&self, params: &[u32]) -> CornerMatchResult<u32> {
        let src = param(params, 0)?;
        let dst = param(params, 1)?;
        let width = param(params, 2)? as usize;
        let height = param(params, 3)? as usize;
        let taps_addr = param(params, 4)?;
        let tap_count = param(params, 5)? as usize;
        let axis = Axis::from_code(param(params, 6)?)
            .ok_or(CornerMatchError::InvalidInput("unknown convolution axis"))?;

        let samples = decode_q15(&self.memory.device_read(src, 0, width * height * 2)?);
        let taps = decode_q15(&self.memory.device_read(taps_addr, 0, tap_count * 2)?);
        let plane = Plane::from_vec(samples, width, height)?;
        let out = plane.convolve(&taps, axis)?;
        self.memory.device_write(dst, 0, &encode_q15(out.data()))?;
        Ok(0)
    }

    fn patch_stats(&self, params: &[u32]) -> CornerMatchResult<u32> {
        let pixels_addr = param(params, 0)?;
        let size = param(params, 1)? as usize;
        let out = param(params, 2)?;

        let pixels = self.read_pixels(pixels_addr, size, size)?;
        let stats = PatchData::<Fixed>::compute(ImageView::from_slice(&pixels, size, size)?)?;
        let mut record = encode_u32s(&[
            encode_scalar(stats.average()),
            encode_scalar(stats.square_sum()),
            encode_scalar(stats.normalized_sum()),
        ]);
        record.extend(encode_q15(stats.normalized()));
        self.memory.device_write(out, 0, &record)?;
        Ok(0)
    }

    fn image_data(&self, params: &[u32]) -> CornerMatchResult<u32> {
        let frame = param(params, 0)?;
        let width = param(params, 1)? as usize;
        let height = param(params, 2)? as usize;
        let tables = param(params, 3)?;

        let pixels = self.read_pixels(frame, width, height)?;
        let integral = IntegralImage::build(ImageView::from_slice(&pixels, width, height)?)?;
        let mut bytes = encode_u64s(integral.sum_table());
        bytes.extend(encode_u64s(integral.sum_sq_table()));
        self.memory.device_write(tables, 0, &bytes)?;
        Ok(0)
    }

    fn read_patch(&self, addr: u32, size: usize) -> CornerMatchResult<PatchData<Fixed>> {
        let record = self.memory.device_read(addr, 0, patch_record_len(size))?;
        let (header, samples) = record.split_at(PATCH_HEADER_WORDS * 4);
        let header = decode_u32s(header);
        PatchData::from_parts(
            size,
            decode_scalar(param(&header, 0)?),
            decode_scalar(param(&header, 1)?),
            decode_q15(samples),
            decode_scalar(param(&header, 2)?),
        )
    }

    fn ncc_area(&self, params: &[u32]) -> CornerMatchResult<u32> {
        let frame = param(params, 0)?;
        let width = param(params, 1)? as usize;
        let height = param(params, 2)? as usize;
        let tables = param(params, 3)?;
        let patch_addr = param(params, 4)?;
        let size = param(params, 5)? as usize;
        let windows_addr = param(params, 6)?;
        let count = param(params, 7)? as usize;
        let result = param(params, 8)?;

        let pixels = self.read_pixels(frame, width, height)?;
        let image = ImageView::from_slice(&pixels, width, height)?;
        let patch = self.read_patch(patch_addr, size)?;

        let integral = if tables == 0 {
            None
        } else {
            let cells = (width + 1) * (height + 1);
            let bytes = self.memory.device_read(tables, 0, cells * 16)?;
            let (sum, sum_sq) = bytes.split_at(cells * 8);
            Some(IntegralImage::from_tables(
                width,
                height,
                decode_u64s(sum),
                decode_u64s(sum_sq),
            )?)
        };
        let stats = if integral.is_some() {
            WindowStats::Integral
        } else {
            WindowStats::Direct
        };

        let points: Vec<Window> = if windows_addr == 0 {
            Vec::new()
        } else {
            decode_u32s(&self.memory.device_read(windows_addr, 0, count * 8)?)
                .chunks_exact(2)
                .map(|pair| Window::new(pair[0] as usize, pair[1] as usize))
                .collect()
        };
        let windows = if windows_addr == 0 {
            WindowSet::Dense
        } else {
            WindowSet::Points(&points)
        };

        let peak = scan::best_window(image, integral.as_ref(), &patch, windows, stats)?;
        let words = match peak {
            Some(peak) => [1, peak.row as u32, peak.col as u32, encode_scalar(peak.score)],
            None => [0; 4],
        };
        self.memory.device_write(result, 0, &encode_u32s(&words))?;
        Ok(words[0])
    }
}
