//! FastCGI name-value pair encoding.

use crate::fastcgi::error::FastCgiError;

/// Lengths at or above this use the 4-byte form.
const SHORT_LEN_LIMIT: usize = 128;
const MAX_LEN: usize = 0x7fff_ffff;

/// Ordered CGI parameters. Names may repeat; order is preserved on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgiParams {
    pairs: Vec<(String, String)>,
}

impl CgiParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Replace every existing value for `name`, or append it.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        self.pairs.retain(|(n, _)| n != name);
        self.pairs.push((name.to_string(), value));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Encode as a PARAMS stream body.
    pub fn encode(&self) -> Result<Vec<u8>, FastCgiError> {
        let mut out = Vec::new();
        for (name, value) in &self.pairs {
            if name.len() > MAX_LEN || value.len() > MAX_LEN {
                return Err(FastCgiError::ParamTooLong(name.clone()));
            }
            encode_len(name.len(), &mut out);
            encode_len(value.len(), &mut out);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }

    /// Decode a PARAMS stream body.
    pub fn decode(mut buf: &[u8]) -> Result<Self, FastCgiError> {
        let mut params = Self::new();
        while !buf.is_empty() {
            let name_len = decode_len(&mut buf)?;
            let value_len = decode_len(&mut buf)?;
            if buf.len() < name_len + value_len {
                return Err(FastCgiError::Protocol("truncated name-value pair".into()));
            }
            let (name, rest) = buf.split_at(name_len);
            let (value, rest) = rest.split_at(value_len);
            params.push(
                String::from_utf8_lossy(name).into_owned(),
                String::from_utf8_lossy(value).into_owned(),
            );
            buf = rest;
        }
        Ok(params)
    }
}

fn encode_len(len: usize, out: &mut Vec<u8>) {
    if len < SHORT_LEN_LIMIT {
        out.push(len as u8);
    } else {
        out.extend_from_slice(&((len as u32) | 0x8000_0000).to_be_bytes());
    }
}

fn decode_len(buf: &mut &[u8]) -> Result<usize, FastCgiError> {
    let first = *buf
        .first()
        .ok_or_else(|| FastCgiError::Protocol("truncated pair length".into()))?;
    if first & 0x80 == 0 {
        *buf = &buf[1..];
        return Ok(first as usize);
    }
    if buf.len() < 4 {
        return Err(FastCgiError::Protocol("truncated pair length".into()));
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) & 0x7fff_ffff;
    *buf = &buf[4..];
    Ok(len as usize)
}
