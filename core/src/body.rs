// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::{Error, Result};

/// Readers a [`RewindableStream`] can wrap.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// RewindableStream is a shared, markable request payload.
///
/// Clones share the same reader, so the engine can keep a handle to the
/// stream it sent and reset it to the mark before the next attempt.
#[derive(Clone)]
pub struct RewindableStream {
    inner: Arc<Mutex<StreamState>>,
}

struct StreamState {
    reader: Box<dyn ReadSeek>,
    mark: u64,
    length: u64,
}

impl RewindableStream {
    /// Wrap `reader`, marking its current position.
    pub fn new(reader: impl Read + Seek + Send + 'static) -> Result<Self> {
        let mut reader = reader;
        let mark = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(mark))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(StreamState {
                reader: Box::new(reader),
                mark,
                length: end.saturating_sub(mark),
            })),
        })
    }

    /// Wrap in-memory content.
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let length = content.len() as u64;

        Self {
            inner: Arc::new(Mutex::new(StreamState {
                reader: Box::new(Cursor::new(content)),
                mark: 0,
                length,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.inner.lock().expect("lock poisoned")
    }

    /// Move the mark to the current position.
    pub fn mark(&self) -> Result<()> {
        let mut state = self.lock();
        let position = state.reader.stream_position()?;
        let end = state.reader.seek(SeekFrom::End(0))?;
        state.reader.seek(SeekFrom::Start(position))?;

        state.mark = position;
        state.length = end.saturating_sub(position);
        Ok(())
    }

    /// Seek back to the mark.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock();
        let mark = state.mark;
        state
            .reader
            .seek(SeekFrom::Start(mark))
            .map_err(|e| Error::unexpected("failed to rewind request body").with_source(e))?;
        Ok(())
    }

    /// Current position of the reader.
    pub fn position(&self) -> Result<u64> {
        Ok(self.lock().reader.stream_position()?)
    }

    /// Number of bytes between the mark and the end.
    pub fn len(&self) -> u64 {
        self.lock().length
    }

    /// Whether nothing follows the mark.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Read for RewindableStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "request body lock poisoned"))?;
        state.reader.read(buf)
    }
}

impl fmt::Debug for RewindableStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(state) => f
                .debug_struct("RewindableStream")
                .field("mark", &state.mark)
                .field("length", &state.length)
                .finish(),
            Err(_) => f.debug_struct("RewindableStream").finish_non_exhaustive(),
        }
    }
}

/// Payload of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// Payload held in memory, replayable for free.
    Bytes(Bytes),
    /// Payload read from a stream that must be rewound between attempts.
    Stream(RewindableStream),
}

impl Body {
    /// Make the payload readable from its start again.
    pub fn rewind(&self) -> Result<()> {
        match self {
            Body::Empty | Body::Bytes(_) => Ok(()),
            Body::Stream(stream) => stream.reset(),
        }
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bs) => bs.len() as u64,
            Body::Stream(stream) => stream.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole payload into memory, leaving a stream at its end.
    pub fn read_to_bytes(&self) -> Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Bytes(bs) => Ok(bs.clone()),
            Body::Stream(stream) => {
                let mut buf = Vec::with_capacity(stream.len() as usize);
                stream.clone().read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl From<Bytes> for Body {
    fn from(bs: Bytes) -> Self {
        Body::Bytes(bs)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bs: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bs))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<RewindableStream> for Body {
    fn from(stream: RewindableStream) -> Self {
        Body::Stream(stream)
    }
}
