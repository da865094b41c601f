//! Single-threaded JavaScript runtime behind an async mailbox.
//!
//! One dedicated OS thread owns the QuickJS heap. Every operation is a
//! message carrying its reply channel, so evaluations from any number of
//! producer tasks are serialized onto the worker; the heap is never touched
//! from another thread. Shutdown raises the engine's interrupt flag, which
//! terminates an in-flight evaluation cooperatively, then joins the worker.

use crate::utils::error::{Error, Result};
use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Context, Function, Runtime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// QuickJS memory ceiling. Parsing a 2.5 MB player script through the
/// solver bundle peaks well below this.
const MEMORY_LIMIT: usize = 256 * 1024 * 1024;

/// The solver recurses deeply on minified input.
const STACK_SIZE: usize = 8 * 1024 * 1024;

enum Command {
    Evaluate {
        code: String,
        reply: oneshot::Sender<Result<()>>,
    },
    EvaluateAndGet {
        code: String,
        reply: oneshot::Sender<Result<String>>,
    },
    CallFunction {
        name: String,
        args: Vec<String>,
        reply: oneshot::Sender<Result<String>>,
    },
    Shutdown,
}

pub struct JsRuntime {
    tx: mpsc::UnboundedSender<Command>,
    interrupt: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl JsRuntime {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let interrupt = Arc::new(AtomicBool::new(false));
        let worker_flag = interrupt.clone();

        let worker = std::thread::Builder::new()
            .name("js-runtime".into())
            .stack_size(STACK_SIZE)
            .spawn(move || worker_loop(rx, worker_flag))
            .map_err(Error::Io)?;

        Ok(Self {
            tx,
            interrupt,
            worker: Some(worker),
        })
    }

    /// Run `code` as a global script.
    pub async fn evaluate(&self, code: String) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Evaluate { code, reply })?;
        rx.await
            .map_err(|_| Error::JsEval("runtime worker gone".into()))?
    }

    /// Run `code` and return the string coercion of its completion value.
    pub async fn evaluate_and_get(&self, code: String) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::EvaluateAndGet { code, reply })?;
        rx.await
            .map_err(|_| Error::JsEval("runtime worker gone".into()))?
    }

    /// Look up a global function and call it with string arguments.
    pub async fn call_function(&self, name: &str, args: Vec<String>) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CallFunction {
            name: name.to_string(),
            args,
            reply,
        })?;
        rx.await
            .map_err(|_| Error::JsEval("runtime worker gone".into()))?
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::JsEval("runtime worker gone".into()))
    }

    /// Raise the interrupt flag so the current evaluation (if any) is
    /// terminated cooperatively. The worker clears the flag once the
    /// interrupted command has settled, so later evaluations run normally.
    pub fn terminate_current(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Terminate any in-flight evaluation and join the worker thread.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.interrupt.store(true, Ordering::SeqCst);
            let _ = self.tx.send(Command::Shutdown);
            if worker.join().is_err() {
                warn!("JS runtime worker panicked during shutdown");
            }
        }
    }
}

impl Drop for JsRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(mut rx: mpsc::UnboundedReceiver<Command>, interrupt: Arc<AtomicBool>) {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            warn!("Failed to create QuickJS runtime: {}", e);
            drain_with_error(&mut rx, &format!("runtime init failed: {}", e));
            return;
        }
    };
    runtime.set_memory_limit(MEMORY_LIMIT);
    runtime.set_max_stack_size(STACK_SIZE / 2);

    let flag = interrupt.clone();
    runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::SeqCst))));

    let context = match Context::full(&runtime) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!("Failed to create QuickJS context: {}", e);
            drain_with_error(&mut rx, &format!("context init failed: {}", e));
            return;
        }
    };

    debug!("JS runtime worker started");
    while let Some(command) = rx.blocking_recv() {
        let shutting_down = matches!(&command, Command::Shutdown);
        match command {
            Command::Evaluate { code, reply } => {
                let res = context.with(|ctx| {
                    ctx.eval::<(), _>(code.into_bytes())
                        .map_err(|e| js_error(&ctx, e))
                });
                let _ = reply.send(res);
            }
            Command::EvaluateAndGet { code, reply } => {
                let res = context.with(|ctx| {
                    ctx.eval::<Coerced<String>, _>(code.into_bytes())
                        .map(|v| v.0)
                        .map_err(|e| js_error(&ctx, e))
                });
                let _ = reply.send(res);
            }
            Command::CallFunction { name, args, reply } => {
                let res = context.with(|ctx| {
                    let func: Function = ctx
                        .globals()
                        .get(name.as_str())
                        .map_err(|e| js_error(&ctx, e))?;
                    func.call::<_, Coerced<String>>((Rest(args),))
                        .map(|v| v.0)
                        .map_err(|e| js_error(&ctx, e))
                });
                let _ = reply.send(res);
            }
            Command::Shutdown => break,
        }
        if !shutting_down {
            // A termination raised mid-evaluation must not poison later ones
            interrupt.store(false, Ordering::SeqCst);
        }
    }
    debug!("JS runtime worker stopped");
}

fn drain_with_error(rx: &mut mpsc::UnboundedReceiver<Command>, message: &str) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Evaluate { reply, .. } => {
                let _ = reply.send(Err(Error::JsEval(message.to_string())));
            }
            Command::EvaluateAndGet { reply, .. } => {
                let _ = reply.send(Err(Error::JsEval(message.to_string())));
            }
            Command::CallFunction { reply, .. } => {
                let _ = reply.send(Err(Error::JsEval(message.to_string())));
            }
            Command::Shutdown => break,
        }
    }
}

/// Format a QuickJS failure, pulling the pending exception off the context
/// so the message names the actual JS error instead of "exception".
fn js_error(ctx: &rquickjs::Ctx<'_>, error: rquickjs::Error) -> Error {
    if matches!(error, rquickjs::Error::Exception) {
        let caught = ctx.catch();
        if let Some(exception) = caught.as_exception() {
            let message = exception.message().unwrap_or_default();
            return Error::JsEval(message);
        }
        return Error::JsEval(format!("{:?}", caught));
    }
    Error::JsEval(error.to_string())
}
