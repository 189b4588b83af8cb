//! RMID files embed a plain Standard Midi File inside a RIFF container.
//! The container is stripped away before decoding, leaving the raw SMF bytes.

use crate::{
    prelude::*,
    primitive::{read_slice, read_u32},
};

/// Iterates over the `(id, data)` subchunks of a RIFF chunk body.
struct RiffChunks<'a>(&'a [u8]);
impl<'a> RiffChunks<'a> {
    fn read_chunk(&mut self) -> Result<([u8; 4], &'a [u8])> {
        let mut id = [0; 4];
        id.copy_from_slice(read_slice(&mut self.0, 4)?);
        //RIFF lengths are little-endian, unlike SMF lengths
        let len = read_u32(&mut self.0)?.swap_bytes() as usize;
        let data = match self.0.split_checked(len) {
            Some(data) => data,
            None if cfg!(feature = "strict") => {
                bail!(err_truncated!("reached eof before riff chunk ended"))
            }
            None => {
                log::debug!("riff chunk length exceeds the file, using the remaining bytes");
                mem::take(&mut self.0)
            }
        };
        if len % 2 == 1 {
            //Odd-sized chunks are followed by a pad byte
            let _pad = self.0.split_checked(1);
        }
        Ok((id, data))
    }
}
impl<'a> Iterator for RiffChunks<'a> {
    type Item = Result<([u8; 4], &'a [u8])>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }
        let chunk = self.read_chunk();
        if chunk.is_err() {
            self.0 = &[];
        }
        Some(chunk)
    }
}

/// If `raw` is an RMID file, extract the SMF data embedded in it.
/// Otherwise return `raw` untouched.
pub(crate) fn unwrap(raw: &[u8]) -> Result<&[u8]> {
    if !raw.starts_with(b"RIFF") {
        return Ok(raw);
    }
    let (_id, mut riff) = RiffChunks(raw).read_chunk()?;
    let form_type = read_slice(&mut riff, 4)?;
    ensure!(form_type == b"RMID", err_header!("riff file is not an rmid file"));
    for chunk in RiffChunks(riff) {
        let (id, data) = chunk?;
        if &id == b"data" {
            log::trace!("unwrapped {} bytes of smf data from rmid file", data.len());
            return Ok(data);
        }
    }
    bail!(err_header!("rmid file has no data chunk"))
}
