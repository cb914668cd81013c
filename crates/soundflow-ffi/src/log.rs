//! Global diagnostic sink: `sf_log_init` / `sf_log_shutdown`.
//!
//! Installs the process-wide `tracing` subscriber once. When the host
//! supplies a callback, formatted log lines are forwarded to it; otherwise
//! they go to stderr. A filter can be set through `SOUNDFLOW_LOG` in the
//! usual `tracing_subscriber::EnvFilter` syntax.

use std::ffi::CString;
use std::io::{self, Write};
use std::os::raw::c_char;
use std::sync::{Mutex, Once};

use soundflow_core::ResultCode;
use tracing_subscriber::EnvFilter;

use crate::guard;

const FILTER_ENV: &str = "SOUNDFLOW_LOG";

/// Receives one formatted log line, NUL-terminated, without a trailing
/// newline. Called from arbitrary threads.
pub type SfLogCallback = unsafe extern "C" fn(message: *const c_char);

struct Sink(SfLogCallback);

unsafe impl Send for Sink {}

static LOG_SINK: Mutex<Option<Sink>> = Mutex::new(None);
static LOG_INIT: Once = Once::new();

struct ForwardWriter;

impl Write for ForwardWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let forwarded = match LOG_SINK.lock() {
            Ok(sink) => match sink.as_ref() {
                Some(sink) => {
                    let text = String::from_utf8_lossy(buf);
                    let line = text.trim_end_matches('\n').replace('\0', "");
                    if let Ok(line) = CString::new(line) {
                        unsafe { (sink.0)(line.as_ptr()) };
                    }
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if !forwarded {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Installs the diagnostic sink. Safe to call more than once; later calls
/// only swap the forwarding callback.
#[no_mangle]
pub extern "C" fn sf_log_init(callback: Option<SfLogCallback>) -> i32 {
    guard(|| {
        if let Ok(mut sink) = LOG_SINK.lock() {
            *sink = callback.map(Sink);
        }
        LOG_INIT.call_once(|| {
            let filter = EnvFilter::try_from_env(FILTER_ENV)
                .unwrap_or_else(|_| EnvFilter::new("info"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(|| ForwardWriter)
                .try_init();
        });
        ResultCode::Success
    })
}

/// Detaches the forwarding callback. Logging falls back to stderr; the
/// host's callback is never invoked after this returns.
#[no_mangle]
pub extern "C" fn sf_log_shutdown() -> i32 {
    guard(|| {
        if let Ok(mut sink) = LOG_SINK.lock() {
            *sink = None;
        }
        ResultCode::Success
    })
}
