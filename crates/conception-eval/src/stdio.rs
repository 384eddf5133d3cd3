//! Process-wide output routes of the Seed runtime.
//!
//! Unit code never touches the host's stdout/stderr handles directly; the
//! `print` family of builtins writes through [`write`], which consults the
//! current route of each stream. A [`Capture`] swaps both routes for one
//! shared buffer and puts the previous routes back when it is dropped,
//! including while a panic unwinds.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex, MutexGuard};

/// One of the two output streams unit code can write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Where a stream currently goes, as seen by [`destination`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The host process's own handle
    Inherit,
    /// The buffer of the capture with this id
    Capture(u64),
}

struct Sink {
    id: u64,
    buffer: Mutex<String>,
}

#[derive(Clone)]
enum Route {
    Inherit,
    Capture(Arc<Sink>),
}

struct Routes {
    stdout: Route,
    stderr: Route,
}

impl Routes {
    fn get(&self, stream: Stream) -> &Route {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }
}

static ROUTES: Mutex<Routes> = const_mutex(Routes {
    stdout: Route::Inherit,
    stderr: Route::Inherit,
});

/// Held for the lifetime of every [`Capture`]
static CAPTURE_LOCK: Mutex<()> = const_mutex(());

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Report where `stream` currently writes.
pub fn destination(stream: Stream) -> Destination {
    match ROUTES.lock().get(stream) {
        Route::Inherit => Destination::Inherit,
        Route::Capture(sink) => Destination::Capture(sink.id),
    }
}

/// Write `text` to the current route of `stream`.
pub fn write(stream: Stream, text: &str) -> io::Result<()> {
    let route = ROUTES.lock().get(stream).clone();
    match route {
        Route::Capture(sink) => {
            sink.buffer.lock().push_str(text);
            Ok(())
        }
        Route::Inherit => match stream {
            Stream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(text.as_bytes())?;
                out.flush()
            }
            Stream::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(text.as_bytes())?;
                err.flush()
            }
        },
    }
}

/// A scoped capture of both output streams into one buffer.
///
/// Only one capture can be installed at a time across the process;
/// [`Capture::install`] blocks until the current one is dropped. Installing
/// a second capture on the thread that holds the first deadlocks.
pub struct Capture {
    sink: Arc<Sink>,
    previous: Option<Routes>,
    _exclusive: MutexGuard<'static, ()>,
}

impl Capture {
    /// Route stdout and stderr into a fresh buffer.
    pub fn install() -> Self {
        let exclusive = CAPTURE_LOCK.lock();
        let sink = Arc::new(Sink {
            id: NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed),
            buffer: Mutex::new(String::new()),
        });

        let previous = std::mem::replace(
            &mut *ROUTES.lock(),
            Routes {
                stdout: Route::Capture(Arc::clone(&sink)),
                stderr: Route::Capture(Arc::clone(&sink)),
            },
        );
        tracing::trace!("installed output capture {}", sink.id);

        Self {
            sink,
            previous: Some(previous),
            _exclusive: exclusive,
        }
    }

    pub fn id(&self) -> u64 {
        self.sink.id
    }

    /// Everything written so far, stdout and stderr interleaved.
    pub fn contents(&self) -> String {
        self.sink.buffer.lock().clone()
    }

    /// Restore the previous routes and return the captured text.
    pub fn finish(self) -> String {
        let text = self.contents();
        drop(self);
        text
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *ROUTES.lock() = previous;
            tracing::trace!("restored output routes after capture {}", self.sink.id);
        }
    }
}
