use tokio::sync::{mpsc, oneshot};

/// Consumer side of one submitted execution.
///
/// `output` yields incremental text chunks as the kernel streams them; the
/// stream closes once the execution has produced everything it will produce.
/// `done` fires after the output stream closes. Consumers that only care
/// about completion may drop `output` unread and await `done` alone.
#[derive(Debug)]
pub struct ExecutionHandle {
    pub output: mpsc::UnboundedReceiver<String>,
    pub done: oneshot::Receiver<()>,
}

/// Producer side of one submitted execution, held by the transport.
#[derive(Debug)]
pub struct ExecutionSink {
    output: mpsc::UnboundedSender<String>,
    done: oneshot::Sender<()>,
}

impl ExecutionHandle {
    /// Create a connected handle/sink pair.
    pub fn pair() -> (ExecutionHandle, ExecutionSink) {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        (
            ExecutionHandle {
                output: output_rx,
                done: done_rx,
            },
            ExecutionSink {
                output: output_tx,
                done: done_tx,
            },
        )
    }
}

impl ExecutionSink {
    /// Stream one chunk of text output. Silently dropped if the consumer is
    /// no longer listening.
    pub fn emit(&self, chunk: impl Into<String>) {
        let _ = self.output.send(chunk.into());
    }

    /// Close the output stream, then signal completion.
    pub fn finish(self) {
        drop(self.output);
        let _ = self.done.send(());
    }
}
