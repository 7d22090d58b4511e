use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use crossbeam_utils::sync::WaitGroup;

use crate::assembly::AssembledImage;
use crate::error::{TextureError, TextureResult};
use crate::load_slot::LoadSlotId;

/// 在 worker 线程上执行的解码/组装任务
pub type LoadJobEntry = Box<dyn FnOnce() -> TextureResult<AssembledImage> + Send + 'static>;

pub struct LoadRequest {
    pub slot: LoadSlotId,
    pub entry: LoadJobEntry,
}

/// 任务完成的消息
///
/// `result` 为 Ok 时 owner 线程执行 on-success (上传 + 替换)，为 Err 时执行 on-failure。
/// 每个提交的请求恰好产生一条完成消息。
pub struct LoadCompletion {
    pub slot: LoadSlotId,
    pub result: TextureResult<AssembledImage>,
}

/// 在调用线程之外执行任务，并把结果交还给 owner 线程
///
/// owner 线程每帧通过 `try_recv` 取回完成消息，再执行对应的回调，
/// 所以回调总是运行在 owner 线程上。
pub trait JobRunner {
    fn submit(&self, request: LoadRequest);

    /// 非阻塞地取一条完成消息
    fn try_recv(&self) -> Option<LoadCompletion>;

    /// 停止接收新任务并等待已经分发的任务结束
    fn shutdown(&mut self) {}
}

/// 执行任务；任务 panic 时转换为 WorkerPanicked，保证一定有一条完成消息
fn run_entry(request: LoadRequest) -> LoadCompletion {
    let _span = tracy_client::span!("run_load_job");
    let LoadRequest { slot, entry } = request;

    let result = catch_unwind(AssertUnwindSafe(entry)).unwrap_or_else(|_| {
        log::error!("Load job for slot {:?} panicked", slot);
        Err(TextureError::WorkerPanicked)
    });
    LoadCompletion { slot, result }
}

/// 基于线程池的 JobRunner
///
/// ## 架构设计
/// - 内部的 `Texture-Load-Dispatcher` 线程负责调度：接收加载请求，分发任务到 worker
/// - rayon 提供 worker 线程池
/// - crossbeam 提供线程间通信的 channel
///     - request_sender / request_rx: owner 线程 -> 调度线程
///     - result_tx / result_receiver: worker -> owner 线程
///
/// # 线程生命周期
/// 调度线程的生命周期与 `ThreadPoolJobRunner` 绑定。shutdown 或 Drop 时：
/// 1. `request_sender` 被销毁，channel 断开
/// 2. 调度线程中的 `recv()` 返回错误，退出循环
/// 3. 调度线程执行 `wg.wait()`，等待所有已分发的 rayon 任务完成
/// 4. owner 线程 `join` 调度线程
pub struct ThreadPoolJobRunner {
    /// 用于向调度线程发送加载请求
    request_sender: Option<Sender<LoadRequest>>,
    /// 用于接收 worker 的完成消息
    result_receiver: Receiver<LoadCompletion>,
    /// 调度线程已退出时，直接用它回报失败
    result_sender: Sender<LoadCompletion>,

    dispatch_thread: Option<thread::JoinHandle<()>>,
}

// new & init
impl ThreadPoolJobRunner {
    /// `worker_threads` 为 0 时使用 rayon 的默认线程数
    pub fn new(worker_threads: usize) -> anyhow::Result<Self> {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<LoadRequest>();
        let (res_tx, res_rx) = crossbeam_channel::unbounded::<LoadCompletion>();

        // 专用的 rayon 线程池，调试器中可以看到 "Texture-Loader-0", "Texture-Loader-1" 等
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|index| format!("Texture-Loader-{}", index))
            .build()
            .context("创建纹理加载线程池失败")?;

        let worker_tx = res_tx.clone();
        let dispatch_thread = thread::Builder::new()
            .name("Texture-Load-Dispatcher".to_string())
            .spawn(move || {
                let wg = WaitGroup::new();

                while let Ok(req) = req_rx.recv() {
                    let _span = tracy_client::span!("ThreadPoolJobRunner::dispatch");

                    let res_tx = worker_tx.clone();
                    // 任务结束时闭包销毁，wg_task 随之 drop
                    let wg_task = wg.clone();

                    pool.spawn(move || {
                        let completion = run_entry(req);
                        let _ = res_tx.send(completion);

                        drop(wg_task);
                    });
                }

                wg.wait();
            })
            .context("创建纹理加载调度线程失败")?;

        Ok(Self {
            request_sender: Some(req_tx),
            result_receiver: res_rx,
            result_sender: res_tx,
            dispatch_thread: Some(dispatch_thread),
        })
    }
}

impl JobRunner for ThreadPoolJobRunner {
    fn submit(&self, request: LoadRequest) {
        let request = match &self.request_sender {
            Some(sender) => match sender.send(request) {
                Ok(()) => return,
                Err(err) => err.into_inner(),
            },
            None => request,
        };

        log::error!("Texture load dispatcher is closed, failing slot {:?}", request.slot);
        let _ = self.result_sender.send(LoadCompletion {
            slot: request.slot,
            result: Err(TextureError::WorkerPanicked),
        });
    }

    fn try_recv(&self) -> Option<LoadCompletion> {
        self.result_receiver.try_recv().ok()
    }

    fn shutdown(&mut self) {
        // 必须先 drop sender，否则调度线程的 recv 会一直阻塞，导致 join 死锁
        self.request_sender = None;

        if let Some(thread) = self.dispatch_thread.take() {
            log::info!("Texture load dispatcher is shutting down, waiting for tasks to complete...");
            if thread.join().is_err() {
                log::error!("Failed to join texture load dispatcher thread");
            }
            log::info!("All texture load tasks completed.");
        }
    }
}

impl Drop for ThreadPoolJobRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 在 submit 时同步执行任务的 JobRunner
///
/// 完成消息要等到下一次 `try_recv` 才被取走，因此槽位在两次 update 之间保持占用，
/// 行为上与线程池一致，但顺序完全确定。
pub struct InlineJobRunner {
    result_sender: Sender<LoadCompletion>,
    result_receiver: Receiver<LoadCompletion>,
}

impl Default for InlineJobRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineJobRunner {
    pub fn new() -> Self {
        let (result_sender, result_receiver) = crossbeam_channel::unbounded();
        Self {
            result_sender,
            result_receiver,
        }
    }
}

impl JobRunner for InlineJobRunner {
    fn submit(&self, request: LoadRequest) {
        let _ = self.result_sender.send(run_entry(request));
    }

    fn try_recv(&self) -> Option<LoadCompletion> {
        self.result_receiver.try_recv().ok()
    }
}
