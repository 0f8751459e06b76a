// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::Stream;

use crate::dispatcher::{DispatchFuture, Dispatcher};
use crate::local_fs::read_best_effort_at;
use crate::{Error, Result, SharedMetadata};

/// An open file held by a stream. Counted in the adapter's open-stream gauge for
/// exactly as long as it lives.
#[derive(Debug)]
struct StreamHandle {
    file: Arc<File>,
    open_streams: Arc<AtomicUsize>,
}

impl StreamHandle {
    fn new(file: File, open_streams: &Arc<AtomicUsize>) -> Self {
        let _ = open_streams.fetch_add(1, Ordering::AcqRel);
        Self {
            file: Arc::new(file),
            open_streams: Arc::clone(open_streams),
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.open_streams.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!("stream handle released");
    }
}

#[derive(Debug)]
enum State {
    Opening(DispatchFuture<Result<File>>),
    Ready(StreamHandle),
    Reading(StreamHandle, DispatchFuture<Result<Vec<u8>>>),
    Done,
}

/// Chunked reader over one file handle.
///
/// Opening starts on a worker as soon as the stream is created; the handle is taken
/// over on first poll. It is released when the recorded size has been consumed, when
/// a read returns nothing, when a read fails, or when the stream is dropped, whichever
/// comes first. A handle opened for a stream dropped before its first poll is closed
/// by the worker and never counted.
#[derive(Debug)]
pub(crate) struct FileChunks {
    dispatcher: Dispatcher,
    path: PathBuf,
    meta: SharedMetadata,
    chunk_size: u64,
    position: u64,
    open_streams: Arc<AtomicUsize>,
    state: State,
}

impl FileChunks {
    pub(crate) fn open(
        dispatcher: &Dispatcher,
        path: PathBuf,
        meta: SharedMetadata,
        chunk_size: usize,
        open_streams: Arc<AtomicUsize>,
    ) -> Self {
        let open_path = path.clone();
        let opening = dispatcher.dispatch(move || File::open(&open_path).map_err(|e| Error::storage(open_path, e)));
        Self {
            dispatcher: dispatcher.clone(),
            path,
            meta,
            chunk_size: chunk_size as u64,
            position: 0,
            open_streams,
            state: State::Opening(opening),
        }
    }
}

impl Stream for FileChunks {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match core::mem::replace(&mut this.state, State::Done) {
                State::Opening(mut opening) => match Pin::new(&mut opening).poll(cx) {
                    Poll::Pending => {
                        this.state = State::Opening(opening);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(file)) => {
                        tracing::debug!(path = %this.path.display(), "stream opened");
                        this.state = State::Ready(StreamHandle::new(file, &this.open_streams));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                },
                State::Ready(handle) => {
                    let remaining = this.meta.size().saturating_sub(this.position);
                    if remaining == 0 {
                        return Poll::Ready(None);
                    }

                    let file = Arc::clone(&handle.file);
                    let path = this.path.clone();
                    let offset = this.position;
                    let wanted = this.chunk_size.min(remaining);
                    let read = this
                        .dispatcher
                        .dispatch(move || read_chunk(&file, offset, wanted).map_err(|e| Error::storage(path, e)));
                    this.state = State::Reading(handle, read);
                }
                State::Reading(handle, mut read) => match Pin::new(&mut read).poll(cx) {
                    Poll::Pending => {
                        this.state = State::Reading(handle, read);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(chunk)) if chunk.is_empty() => return Poll::Ready(None),
                    Poll::Ready(Ok(chunk)) => {
                        this.position += chunk.len() as u64;
                        this.state = State::Ready(handle);
                        return Poll::Ready(Some(Ok(Bytes::from(chunk))));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                },
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Reads the next chunk, never allocating more than the file holds past `offset`.
fn read_chunk(file: &File, offset: u64, wanted: u64) -> std::io::Result<Vec<u8>> {
    let available = file.metadata()?.len().saturating_sub(offset);
    // Bounded by chunk_size, which came from a usize.
    let len = usize::try_from(wanted.min(available)).unwrap_or(usize::MAX);
    read_best_effort_at(file, offset, len)
}
