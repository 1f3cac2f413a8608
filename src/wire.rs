//! Framing shared by both protocols.
//!
//! Big integers travel as an 8-byte little-endian length followed by that many
//! big-endian magnitude bytes. Status codes, counts, indices and challenge bits
//! travel as bare 4-byte little-endian integers.

use std::io::{Read, Write};

use num_bigint::BigUint;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use num_traits::Zero;

use crate::error::{Error, Result};

/// Upper bound on an incoming integer; larger prefixes are treated as garbage.
pub const MAX_NUMBER_BYTES: u64 = 1 << 16;

/// Answer to a claimed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum IdStatus {
    Ok = 0,
    Invalid = 1,
    Used = 2,
}

/// Verdict on a registration opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Feedback {
    Ok = 0,
    NotOk = 1,
}

/// Verdict on a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum VoteStatus {
    Ok = 0,
    Invalid = 1,
    Fraud = 2,
}

/// A request/response session over a reliable byte stream.
///
/// Outgoing frames are buffered and flushed before every read, so a whole
/// protocol step leaves in one write.
pub struct Channel<S> {
    stream: S,
    pending: Vec<u8>,
}

impl<S: Read + Write> Channel<S> {
    pub fn new(stream: S) -> Self {
        Channel {
            stream,
            pending: Vec::new(),
        }
    }

    pub fn send_number(&mut self, number: &BigUint) {
        let bytes = if number.is_zero() {
            Vec::new()
        } else {
            number.to_bytes_be()
        };
        self.pending
            .extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        self.pending.extend_from_slice(&bytes);
    }

    pub fn send_numbers<'a, I>(&mut self, numbers: I)
    where
        I: IntoIterator<Item = &'a BigUint>,
    {
        for number in numbers {
            self.send_number(number);
        }
    }

    pub fn send_u32(&mut self, value: u32) {
        self.pending.extend_from_slice(&value.to_le_bytes());
    }

    pub fn send_status<T: Into<u32>>(&mut self, status: T) {
        self.send_u32(status.into());
    }

    /// Writes everything buffered so far.
    pub fn flush(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            self.stream.write_all(&self.pending)?;
            self.pending.clear();
        }
        self.stream.flush()?;
        Ok(())
    }

    pub fn recv_number(&mut self) -> Result<BigUint> {
        self.flush()?;
        let mut length = [0u8; 8];
        self.stream.read_exact(&mut length)?;
        let length = u64::from_le_bytes(length);
        if length > MAX_NUMBER_BYTES {
            return Err(Error::Protocol(format!(
                "integer of {} bytes exceeds the {} byte limit",
                length, MAX_NUMBER_BYTES
            )));
        }
        let mut bytes = vec![0u8; length as usize];
        self.stream.read_exact(&mut bytes)?;
        Ok(BigUint::from_bytes_be(&bytes))
    }

    pub fn recv_numbers(&mut self, count: usize) -> Result<Vec<BigUint>> {
        (0..count).map(|_| self.recv_number()).collect()
    }

    pub fn recv_u32(&mut self) -> Result<u32> {
        self.flush()?;
        let mut value = [0u8; 4];
        self.stream.read_exact(&mut value)?;
        Ok(u32::from_le_bytes(value))
    }

    pub fn recv_status<T>(&mut self) -> Result<T>
    where
        T: TryFromPrimitive<Primitive = u32>,
    {
        let raw = self.recv_u32()?;
        T::try_from_primitive(raw)
            .map_err(|_| Error::Protocol(format!("unknown {} code {}", T::NAME, raw)))
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// A stream that replays canned peer frames and records what is written.
#[cfg(test)]
pub(crate) struct Scripted {
    pub input: std::io::Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

#[cfg(test)]
impl Scripted {
    pub fn new(input: Vec<u8>) -> Self {
        Scripted {
            input: std::io::Cursor::new(input),
            output: Vec::new(),
        }
    }
}

#[cfg(test)]
impl Read for Scripted {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

#[cfg(test)]
impl Write for Scripted {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
