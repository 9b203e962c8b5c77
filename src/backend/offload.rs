//! Backend that delegates every primitive to a coprocessor session.

use crate::backend::{ComputeBackend, NccQuery, Peak, WindowSet, WindowStats};
use crate::feature::PatchData;
use crate::fixed::Fixed;
use crate::image::{check_taps, Axis, ImageView, Plane};
use crate::offload::memory::{SharedBuffer, SharedMemory};
use crate::offload::protocol::{
    decode_q15, decode_scalar, decode_u32s, encode_q15, encode_u32s, patch_record_len, Opcode,
    NCC_RESULT_WORDS, PATCH_HEADER_WORDS,
};
use crate::offload::session::{Session, SessionState};
use crate::util::alloc::try_with_capacity;
use crate::util::{CornerMatchError, CornerMatchResult};

/// Patch statistics resident in shared memory, with a host copy.
#[derive(Debug)]
pub struct DevicePatch {
    record: SharedBuffer,
    stats: PatchData<Fixed>,
}

impl DevicePatch {
    /// Shared buffer holding the encoded record.
    pub fn buffer(&self) -> &SharedBuffer {
        &self.record
    }
}

impl AsRef<PatchData<Fixed>> for DevicePatch {
    fn as_ref(&self) -> &PatchData<Fixed> {
        &self.stats
    }
}

/// Frame pixels (and integral tables once computed) in shared memory.
#[derive(Debug)]
pub struct DeviceFrame {
    pixels: SharedBuffer,
    width: usize,
    height: usize,
    tables: Option<SharedBuffer>,
}

impl DeviceFrame {
    /// Frame width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// True once `image_data` ran for this frame.
    pub fn has_image_data(&self) -> bool {
        self.tables.is_some()
    }
}

fn word(value: usize) -> CornerMatchResult<u32> {
    u32::try_from(value).map_err(|_| CornerMatchError::InvalidInput("value exceeds a wire word"))
}

/// [`ComputeBackend`] over a [`Session`]; `Fixed` arithmetic only.
///
/// Every request writes its parameter block, hands all touched buffers to
/// the coprocessor, waits for the reply and hands them back before any
/// result is read, even when the request failed.
#[derive(Debug)]
pub struct OffloadBackend {
    session: Session,
}

impl OffloadBackend {
    /// Pool size used by [`OffloadBackend::emulated`].
    pub const DEFAULT_POOL_BYTES: usize = 16 << 20;

    /// Wraps a session that has reached `Ready`.
    pub fn new(session: Session) -> CornerMatchResult<Self> {
        if session.state() != SessionState::Ready {
            return Err(CornerMatchError::InvalidSessionState {
                operation: "create an offload backend",
                state: "not ready",
            });
        }
        Ok(Self { session })
    }

    /// Backend on a freshly spawned emulated coprocessor.
    pub fn emulated() -> CornerMatchResult<Self> {
        Self::emulated_with_pool(Self::DEFAULT_POOL_BYTES)
    }

    /// Backend on an emulated coprocessor with a pool of `pool_bytes`.
    pub fn emulated_with_pool(pool_bytes: usize) -> CornerMatchResult<Self> {
        Self::new(Session::emulated(pool_bytes)?)
    }

    /// Returns the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the pool shared with the coprocessor.
    pub fn memory(&self) -> &SharedMemory {
        self.session.memory()
    }

    fn upload(&self, bytes: &[u8]) -> CornerMatchResult<SharedBuffer> {
        let buffer = self.memory().alloc(bytes.len())?;
        buffer.write(0, bytes)?;
        Ok(buffer)
    }

    fn round_trip(
        &mut self,
        opcode: Opcode,
        params: &[u32],
        buffers: &[&SharedBuffer],
    ) -> CornerMatchResult<u32> {
        let block = self.upload(&encode_u32s(params))?;

        let mut begun: Vec<&SharedBuffer> = Vec::with_capacity(buffers.len() + 1);
        let mut handed_over = Ok(());
        for &buffer in std::iter::once(&&block).chain(buffers) {
            if let Err(err) = buffer.begin() {
                handed_over = Err(err);
                break;
            }
            begun.push(buffer);
        }

        let reply = handed_over.and_then(|()| {
            self.session
                .request(opcode, block.device_addr(), word(params.len())?)
        });

        let mut returned = Ok(());
        for buffer in begun {
            if let Err(err) = buffer.end() {
                returned = returned.and(Err(err));
            }
        }
        let reply = reply?;
        returned?;
        Ok(reply.arg2)
    }
}

impl ComputeBackend for OffloadBackend {
    type Sample = Fixed;
    type Patch = DevicePatch;
    type Frame = DeviceFrame;

    fn name(&self) -> &'static str {
        "offload"
    }

    fn convolve(
        &mut self,
        plane: &Plane<Fixed>,
        taps: &[Fixed],
        axis: Axis,
    ) -> CornerMatchResult<Plane<Fixed>> {
        check_taps(taps)?;
        let (width, height) = (plane.width(), plane.height());
        let src = self.upload(&encode_q15(plane.data()))?;
        let dst = self.memory().alloc(width * height * 2)?;
        let tap_buffer = self.upload(&encode_q15(taps))?;

        self.round_trip(
            Opcode::Convolve,
            &[
                src.device_addr(),
                dst.device_addr(),
                word(width)?,
                word(height)?,
                tap_buffer.device_addr(),
                word(taps.len())?,
                axis.code(),
            ],
            &[&src, &dst, &tap_buffer],
        )?;

        let samples = decode_q15(&dst.read(0, width * height * 2)?);
        Plane::from_vec(samples, width, height)
    }

    fn patch_stats(&mut self, patch: ImageView<'_, u8>) -> CornerMatchResult<DevicePatch> {
        let size = patch.width();
        if patch.height() != size {
            return Err(CornerMatchError::InvalidInput("patch must be square"));
        }
        let pixels = self.upload(&patch.to_contiguous()?)?;
        let record = self.memory().alloc(patch_record_len(size))?;

        self.round_trip(
            Opcode::PatchStats,
            &[pixels.device_addr(), word(size)?, record.device_addr()],
            &[&pixels, &record],
        )?;

        let bytes = record.read(0, patch_record_len(size))?;
        let (header, samples) = bytes.split_at(PATCH_HEADER_WORDS * 4);
        let header = decode_u32s(header);
        let stats = PatchData::from_parts(
            size,
            decode_scalar(header[0]),
            decode_scalar(header[1]),
            decode_q15(samples),
            decode_scalar(header[2]),
        )?;
        Ok(DevicePatch { record, stats })
    }

    fn load_frame(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<DeviceFrame> {
        Ok(DeviceFrame {
            pixels: self.upload(&image.to_contiguous()?)?,
            width: image.width(),
            height: image.height(),
            tables: None,
        })
    }

    fn image_data(&mut self, frame: &mut DeviceFrame) -> CornerMatchResult<()> {
        let cells = (frame.width + 1) * (frame.height + 1);
        let tables = self.memory().alloc(cells * 16)?;
        self.round_trip(
            Opcode::ImageData,
            &[
                frame.pixels.device_addr(),
                word(frame.width)?,
                word(frame.height)?,
                tables.device_addr(),
            ],
            &[&frame.pixels, &tables],
        )?;
        frame.tables = Some(tables);
        Ok(())
    }

    fn ncc_area(
        &mut self,
        frame: &DeviceFrame,
        patch: &DevicePatch,
        query: NccQuery<'_>,
    ) -> CornerMatchResult<Option<Peak<Fixed>>> {
        let tables = match query.stats {
            WindowStats::Direct => None,
            WindowStats::Integral => Some(
                frame
                    .tables
                    .as_ref()
                    .ok_or(CornerMatchError::MissingImageData)?,
            ),
        };
        let windows = match query.windows {
            WindowSet::Points([]) => return Ok(None),
            WindowSet::Points(points) => {
                let mut words = try_with_capacity(points.len().saturating_mul(2))?;
                for w in points {
                    words.push(word(w.row)?);
                    words.push(word(w.col)?);
                }
                Some((self.upload(&encode_u32s(&words))?, points.len()))
            }
            WindowSet::Dense => None,
        };
        let result = self.memory().alloc(NCC_RESULT_WORDS * 4)?;

        let mut buffers = vec![&frame.pixels, &patch.record, &result];
        buffers.extend(tables);
        buffers.extend(windows.as_ref().map(|(buffer, _)| buffer));
        let params = [
            frame.pixels.device_addr(),
            word(frame.width)?,
            word(frame.height)?,
            tables.map_or(0, |t| t.device_addr()),
            patch.record.device_addr(),
            word(patch.stats.size())?,
            windows.as_ref().map_or(0, |(buffer, _)| buffer.device_addr()),
            word(windows.as_ref().map_or(0, |(_, count)| *count))?,
            result.device_addr(),
        ];
        self.round_trip(Opcode::NccArea, &params, &buffers)?;

        let words = decode_u32s(&result.read(0, NCC_RESULT_WORDS * 4)?);
        if words.first().copied().unwrap_or(0) == 0 {
            return Ok(None);
        }
        Ok(Some(Peak {
            row: words[1] as usize,
            col: words[2] as usize,
            score: decode_scalar(words[3]),
        }))
    }
}
