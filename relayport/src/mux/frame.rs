//! Frame layout:
//!
//! ```text
//! +---------+---------+-------------------+---------------------------------------+
//! | ver (1) | cmd (1) | length (2, LE)    | stream id (4, LE)                     |
//! +---------+---------+-------------------+---------------------------------------+
//! | payload (length bytes)                                                        |
//! +-------------------------------------------------------------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::MuxError;

pub const VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Open a stream
    Syn = 0,
    /// Half-close a stream
    Fin = 1,
    /// Stream data
    Psh = 2,
    /// Keep-alive
    Nop = 3,
}

impl TryFrom<u8> for Cmd {
    type Error = MuxError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Cmd::Syn),
            1 => Ok(Cmd::Fin),
            2 => Ok(Cmd::Psh),
            3 => Ok(Cmd::Nop),
            other => Err(MuxError::InvalidCommand(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub cmd: Cmd,
    pub length: u16,
    pub sid: u32,
}

impl Header {
    pub fn decode(raw: &[u8; HEADER_SIZE]) -> Result<Self, MuxError> {
        let mut raw = &raw[..];
        let version = raw.get_u8();
        if version != VERSION {
            return Err(MuxError::InvalidVersion(version));
        }
        let cmd = Cmd::try_from(raw.get_u8())?;
        let length = raw.get_u16_le();
        let sid = raw.get_u32_le();
        Ok(Self { cmd, length, sid })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(VERSION);
        dst.put_u8(self.cmd as u8);
        dst.put_u16_le(self.length);
        dst.put_u32_le(self.sid);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: Cmd,
    pub sid: u32,
    pub data: Bytes,
}

impl Frame {
    pub fn new(cmd: Cmd, sid: u32) -> Self {
        Self {
            cmd,
            sid,
            data: Bytes::new(),
        }
    }

    /// PSH frame. Callers keep `data` within the configured frame size.
    pub fn data(sid: u32, data: Bytes) -> Self {
        Self {
            cmd: Cmd::Psh,
            sid,
            data,
        }
    }

    /// Header and payload in one buffer, so a frame maps to one transport write.
    pub fn encode(&self) -> Bytes {
        debug_assert!(self.data.len() <= u16::MAX as usize);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.data.len());
        Header {
            cmd: self.cmd,
            length: self.data.len() as u16,
            sid: self.sid,
        }
        .encode(&mut buf);
        buf.put_slice(&self.data);
        buf.freeze()
    }
}
