//! Wire codec for MEXC aggregate-deals frames.
//!
//! Trade frames arrive as length-prefixed binary records, all integers
//! big-endian:
//!
//! ```text
//! frame  := count:u16 record*
//! record := len:u16 payload          (len covers payload only)
//! payload:= side:u8 time_ms:i64 price_len:u16 price:ascii qty_len:u16 qty:ascii
//! ```
//!
//! `side` is 1 for buy, 2 for sell; price and quantity are ASCII decimal
//! strings so no precision is lost on the wire. Decode failures are
//! reported, logged by the caller, and skipped; they never kill a stream.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{Amount, Price};
use crate::exchange::Side;

/// One aggregated trade execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeTick {
    pub price: Price,
    pub quantity: Amount,
    pub side: Side,
    pub time_ms: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    #[error("unknown side tag {0}")]
    BadSide(u8),

    #[error("field is not valid ascii decimal")]
    BadDecimal,

    #[error("{0} trailing bytes after last record")]
    TrailingBytes(usize),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::Truncated {
                need: self.pos + n,
                have: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn decimal(&mut self) -> Result<Decimal, CodecError> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        let text = std::str::from_utf8(raw).map_err(|_| CodecError::BadDecimal)?;
        Decimal::from_str(text).map_err(|_| CodecError::BadDecimal)
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Decode one aggregate-deals frame into trade ticks.
///
/// # Errors
///
/// Any structural violation returns a [`CodecError`]; partial output is
/// never produced.
pub fn decode_deals(frame: &[u8]) -> Result<Vec<TradeTick>, CodecError> {
    let mut reader = Reader::new(frame);
    let count = usize::from(reader.u16()?);
    let mut ticks = Vec::with_capacity(count);

    for _ in 0..count {
        let len = usize::from(reader.u16()?);
        let payload = reader.take(len)?;
        ticks.push(decode_record(payload)?);
    }

    if reader.remaining() != 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }
    Ok(ticks)
}

fn decode_record(payload: &[u8]) -> Result<TradeTick, CodecError> {
    let mut reader = Reader::new(payload);
    let side = match reader.u8()? {
        1 => Side::Buy,
        2 => Side::Sell,
        other => return Err(CodecError::BadSide(other)),
    };
    let time_ms = reader.i64()?;
    let price = reader.decimal()?;
    let quantity = reader.decimal()?;

    Ok(TradeTick {
        price,
        quantity,
        side,
        time_ms,
    })
}
