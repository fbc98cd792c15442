// crates/query-relay-gateway/src/approval.rs
// ============================================================================
// Module: Approval State Machine
// Description: Human approval gate for write statements.
// Purpose: Suspend a write until an operator answers, with a bounded wait.
// Dependencies: query-relay-core, async-trait, tokio
// ============================================================================

//! ## Overview
//! An [`ApprovalSession`] moves through
//! `Proposed → Pending → (Approved → (Executed | ExecutionFailed)) | Rejected
//! | TimedOut | Abandoned`. Every transition is recorded on the audit sink.
//! The wait on the operator is an `.await` on an [`Approver`], so other
//! requests keep running while one waits.
//!
//! Invariants:
//! - One session per request; sessions are never merged.
//! - Only `Approved` leads to `Executed`.
//! - `Pending` is recorded only after the request has been surfaced, and the
//!   wait window starts there.
//! - A session dropped before a decision records `Abandoned`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use query_relay_config::ApprovalConfig;
use query_relay_config::ApprovalMode;
use query_relay_core::ApprovalContext;
use query_relay_core::DatabaseId;
use query_relay_core::RequestId;
use query_relay_core::hash_canonical_json;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::Stderr;
use tokio::io::Stdin;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::audit::ApprovalAuditEvent;
use crate::audit::AuditSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Write awaiting an operator decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// Request the approval belongs to.
    pub request_id: RequestId,
    /// Target database.
    pub database_id: DatabaseId,
    /// Statement text with placeholders only.
    pub sql_text: String,
    /// Bound parameter names.
    pub parameter_names: Vec<String>,
    /// Caller-supplied reason and entity descriptions.
    pub context: ApprovalContext,
}

/// Operator answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Operator answered yes.
    Approved,
    /// Operator answered no.
    Rejected,
}

/// Approval lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Request created, not yet shown to an operator.
    Proposed,
    /// Shown to an operator, awaiting an answer.
    Pending,
    /// Operator approved.
    Approved,
    /// Operator rejected, or the request could not be surfaced or answered.
    Rejected,
    /// No answer within the wait window.
    TimedOut,
    /// Caller went away before a decision.
    Abandoned,
    /// Approved statement ran.
    Executed,
    /// Approved statement failed at the database.
    ExecutionFailed,
}

impl ApprovalState {
    /// Returns true when `next` is a legal successor.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Pending | Self::Rejected | Self::Abandoned)
                | (
                    Self::Pending,
                    Self::Approved | Self::Rejected | Self::TimedOut | Self::Abandoned
                )
                | (Self::Approved, Self::Executed | Self::ExecutionFailed)
        )
    }

    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::TimedOut => "timed_out",
            Self::Abandoned => "abandoned",
            Self::Executed => "executed",
            Self::ExecutionFailed => "execution_failed",
        }
    }

    /// Returns true when no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::TimedOut | Self::Abandoned | Self::Executed | Self::ExecutionFailed
        )
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    /// No operator surface could take the request.
    #[error("approval unavailable: {0}")]
    Unavailable(String),
    /// Internal state machine misuse.
    #[error("invalid approval transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: ApprovalState,
        /// Requested state.
        to: ApprovalState,
    },
}

// ============================================================================
// SECTION: Approver Trait
// ============================================================================

/// Operator surface that answers approval requests.
///
/// Approval is two steps: [`Approver::surface`] returns once an operator
/// can see the request, and [`PendingAnswer::answer`] waits for the reply.
/// The gate starts the wait window between the two.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Presents the request to an operator.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Unavailable`] when no operator surface can
    /// take the request.
    async fn surface(
        &self,
        request: &ApprovalRequest,
    ) -> Result<Box<dyn PendingAnswer>, ApprovalError>;
}

/// Surfaced request awaiting the operator's reply.
#[async_trait]
pub trait PendingAnswer: Send {
    /// Waits for the operator's answer.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Unavailable`] when no answer can be obtained.
    async fn answer(self: Box<Self>) -> Result<ApprovalDecision, ApprovalError>;
}

/// Answer known at surfacing time.
struct Immediate(
    /// Decision to report.
    ApprovalDecision,
);

#[async_trait]
impl PendingAnswer for Immediate {
    async fn answer(self: Box<Self>) -> Result<ApprovalDecision, ApprovalError> {
        Ok(self.0)
    }
}

/// Approver that rejects every write.
pub struct DenyAllApprover;

#[async_trait]
impl Approver for DenyAllApprover {
    async fn surface(
        &self,
        _request: &ApprovalRequest,
    ) -> Result<Box<dyn PendingAnswer>, ApprovalError> {
        Ok(Box::new(Immediate(ApprovalDecision::Rejected)))
    }
}

// ============================================================================
// SECTION: Terminal Approver
// ============================================================================

/// Operator console: answer input plus prompt output.
struct Console<R, W> {
    /// Buffered operator input.
    input: BufReader<R>,
    /// Prompt output.
    output: W,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Console<R, W> {
    /// Drops input typed before the current prompt.
    fn discard_buffered(&mut self) {
        let buffered = self.input.buffer().len();
        self.input.consume(buffered);
    }

    /// Writes and flushes prompt text.
    async fn show(&mut self, text: &str) -> Result<(), ApprovalError> {
        self.output.write_all(text.as_bytes()).await.map_err(unavailable)?;
        self.output.flush().await.map_err(unavailable)
    }
}

/// Approver that prompts on the gateway's terminal.
///
/// Prompts are serialized so one operator sees one request at a time. An
/// approval must name the request id (`y req-7`), so a late answer typed
/// for an earlier prompt never approves a later one.
pub struct TerminalApprover<R = Stdin, W = Stderr> {
    /// Shared console; the lock also serializes prompts.
    console: Arc<Mutex<Console<R, W>>>,
}

impl TerminalApprover {
    /// Creates an approver bound to the process stdin and stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stderr())
    }
}

impl Default for TerminalApprover {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> TerminalApprover<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates an approver over arbitrary operator streams.
    #[must_use]
    pub fn with_io(input: R, output: W) -> Self {
        Self {
            console: Arc::new(Mutex::new(Console {
                input: BufReader::new(input),
                output,
            })),
        }
    }
}

#[async_trait]
impl<R, W> Approver for TerminalApprover<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn surface(
        &self,
        request: &ApprovalRequest,
    ) -> Result<Box<dyn PendingAnswer>, ApprovalError> {
        let mut console = Arc::clone(&self.console).lock_owned().await;
        console.discard_buffered();
        console.show(&render_prompt(request)).await?;
        Ok(Box::new(TerminalAnswer {
            console,
            request_id: request.request_id.clone(),
        }))
    }
}

/// Terminal prompt holding the console until answered or dropped.
struct TerminalAnswer<R, W> {
    /// Console lock held for the life of the prompt.
    console: OwnedMutexGuard<Console<R, W>>,
    /// Request the prompt is for.
    request_id: RequestId,
}

#[async_trait]
impl<R, W> PendingAnswer for TerminalAnswer<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn answer(self: Box<Self>) -> Result<ApprovalDecision, ApprovalError> {
        let Self {
            mut console,
            request_id,
        } = *self;
        loop {
            let mut line = String::new();
            let read = console.input.read_line(&mut line).await.map_err(unavailable)?;
            if read == 0 {
                return Err(ApprovalError::Unavailable("operator input closed".to_string()));
            }
            match parse_answer(&line, &request_id) {
                OperatorReply::Decided(decision) => return Ok(decision),
                OperatorReply::OtherRequest => {}
                OperatorReply::MissingId => {
                    console.show(&format!("type 'y {request_id}' to approve: ")).await?;
                }
            }
        }
    }
}

/// Renders an approval request for an operator.
#[must_use]
pub fn render_prompt(request: &ApprovalRequest) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "\n=== write approval required ({}) ===", request.request_id);
    let _ = writeln!(prompt, "database: {}", request.database_id);
    let _ = writeln!(prompt, "reason:   {}", request.context.reason);
    let _ = writeln!(prompt, "sql:      {}", request.sql_text);
    if !request.parameter_names.is_empty() {
        let _ = writeln!(prompt, "params:   {}", request.parameter_names.join(", "));
    }
    for (key, description) in &request.context.entity_descriptions {
        let _ = writeln!(prompt, "  - {key}: {description}");
    }
    let _ = write!(prompt, "approve? [y {}/N] ", request.request_id);
    prompt
}

/// Parsed operator input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperatorReply {
    /// Answer for the current request.
    Decided(ApprovalDecision),
    /// Answer naming a different request; ignored.
    OtherRequest,
    /// Approval without the request id; ignored.
    MissingId,
}

/// Parses an operator line against the request being prompted.
///
/// Approval needs `y <request-id>`; any other answer without an id, or
/// with this request's id, is a rejection.
fn parse_answer(line: &str, request_id: &RequestId) -> OperatorReply {
    let mut words = line.split_whitespace();
    let answer = words.next().unwrap_or_default().to_ascii_lowercase();
    let named = words.next();
    if named.is_some_and(|id| id != request_id.as_str()) || words.next().is_some() {
        return OperatorReply::OtherRequest;
    }
    match (answer.as_str(), named) {
        ("y" | "yes", Some(_)) => OperatorReply::Decided(ApprovalDecision::Approved),
        ("y" | "yes", None) => OperatorReply::MissingId,
        _ => OperatorReply::Decided(ApprovalDecision::Rejected),
    }
}

/// Maps an operator I/O failure.
#[allow(clippy::needless_pass_by_value, reason = "Used as a map_err adapter.")]
fn unavailable(err: std::io::Error) -> ApprovalError {
    ApprovalError::Unavailable(err.to_string())
}

// ============================================================================
// SECTION: Channel Approver
// ============================================================================

/// Approval handed to an external operator surface.
#[derive(Debug)]
pub struct PendingApproval {
    /// Request to present.
    pub request: ApprovalRequest,
    /// Answer channel back to the waiting gateway task.
    responder: oneshot::Sender<ApprovalDecision>,
}

impl PendingApproval {
    /// Sends the decision; returns false when the request was abandoned.
    pub fn respond(self, decision: ApprovalDecision) -> bool {
        self.responder.send(decision).is_ok()
    }

    /// Approves the request.
    pub fn approve(self) -> bool {
        self.respond(ApprovalDecision::Approved)
    }

    /// Rejects the request.
    pub fn reject(self) -> bool {
        self.respond(ApprovalDecision::Rejected)
    }
}

/// Approver that forwards requests over a channel to an external UI.
///
/// A request counts as surfaced once the UI's queue has accepted it.
#[derive(Clone)]
pub struct ChannelApprover {
    /// Outbound queue of pending approvals.
    sender: mpsc::Sender<PendingApproval>,
}

impl ChannelApprover {
    /// Creates an approver and the receiving end for the operator UI.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingApproval>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl Approver for ChannelApprover {
    async fn surface(
        &self,
        request: &ApprovalRequest,
    ) -> Result<Box<dyn PendingAnswer>, ApprovalError> {
        let (responder, answer) = oneshot::channel();
        self.sender
            .send(PendingApproval {
                request: request.clone(),
                responder,
            })
            .await
            .map_err(|_| ApprovalError::Unavailable("operator channel closed".to_string()))?;
        Ok(Box::new(ChannelAnswer(answer)))
    }
}

/// Reply slot for a channel approval.
struct ChannelAnswer(
    /// Receiver completed by [`PendingApproval::respond`].
    oneshot::Receiver<ApprovalDecision>,
);

#[async_trait]
impl PendingAnswer for ChannelAnswer {
    async fn answer(self: Box<Self>) -> Result<ApprovalDecision, ApprovalError> {
        self.0
            .await
            .map_err(|_| ApprovalError::Unavailable("operator dropped the request".to_string()))
    }
}

/// Builds the configured approver.
#[must_use]
pub fn approver_from_config(config: &ApprovalConfig) -> Arc<dyn Approver> {
    match config.mode {
        ApprovalMode::Terminal => Arc::new(TerminalApprover::new()),
        ApprovalMode::DenyAll => Arc::new(DenyAllApprover),
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Audited approval lifecycle for one request.
pub struct ApprovalSession {
    /// Request the session belongs to.
    request_id: RequestId,
    /// Current state.
    state: ApprovalState,
    /// Audit sink for transitions.
    audit: Arc<dyn AuditSink>,
    /// Failure detail from the approver, if any.
    detail: Option<String>,
}

impl ApprovalSession {
    /// Creates a session in `Proposed` and records the proposal.
    fn propose(request: &ApprovalRequest, audit: Arc<dyn AuditSink>) -> Self {
        let context_hash = hash_canonical_json(&ContextDigest::from(&request.context)).ok();
        audit.record_approval(&ApprovalAuditEvent::new(
            request.request_id.as_str().to_string(),
            None,
            ApprovalState::Proposed,
            context_hash,
            None,
        ));
        Self {
            request_id: request.request_id.clone(),
            state: ApprovalState::Proposed,
            audit,
            detail: None,
        }
    }

    /// Moves to `next` and records the transition.
    fn advance(&mut self, next: ApprovalState, detail: Option<String>) -> Result<(), ApprovalError> {
        if !self.state.can_transition(next) {
            return Err(ApprovalError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.audit.record_approval(&ApprovalAuditEvent::new(
            self.request_id.as_str().to_string(),
            Some(self.state),
            next,
            None,
            detail.clone(),
        ));
        self.state = next;
        self.detail = detail;
        Ok(())
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ApprovalState {
        self.state
    }

    /// Returns the approver failure detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns true when the operator approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.state == ApprovalState::Approved
    }

    /// Records that the approved statement ran.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidTransition`] unless approved.
    pub fn executed(mut self) -> Result<(), ApprovalError> {
        self.advance(ApprovalState::Executed, None)
    }

    /// Records that the approved statement failed.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidTransition`] unless approved.
    pub fn execution_failed(mut self, error: String) -> Result<(), ApprovalError> {
        self.advance(ApprovalState::ExecutionFailed, Some(error))
    }
}

impl Drop for ApprovalSession {
    fn drop(&mut self) {
        if matches!(self.state, ApprovalState::Proposed | ApprovalState::Pending) {
            let _ = self.advance(ApprovalState::Abandoned, None);
        }
    }
}

/// Hashable projection of an approval context.
#[derive(Serialize)]
struct ContextDigest<'a> {
    /// Caller reason.
    reason: &'a str,
    /// Entity descriptions.
    entity_descriptions: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a ApprovalContext> for ContextDigest<'a> {
    fn from(context: &'a ApprovalContext) -> Self {
        Self {
            reason: &context.reason,
            entity_descriptions: &context.entity_descriptions,
        }
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Approval gate combining an approver, a wait window, and auditing.
#[derive(Clone)]
pub struct ApprovalGate {
    /// Operator surface.
    approver: Arc<dyn Approver>,
    /// Wait window.
    timeout: Duration,
    /// Audit sink for transitions.
    audit: Arc<dyn AuditSink>,
}

impl ApprovalGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(approver: Arc<dyn Approver>, timeout: Duration, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            approver,
            timeout,
            audit,
        }
    }

    /// Surfaces the request and waits for a decision or the timeout.
    ///
    /// The session becomes `Pending` only once the approver has surfaced the
    /// request, and the wait window starts there. The returned session is
    /// `Approved`, `Rejected`, or `TimedOut`. Dropping this future before a
    /// decision records `Abandoned`.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidTransition`] on internal misuse.
    pub async fn review(&self, request: &ApprovalRequest) -> Result<ApprovalSession, ApprovalError> {
        let mut session = ApprovalSession::propose(request, Arc::clone(&self.audit));
        let pending = match self.approver.surface(request).await {
            Ok(pending) => pending,
            Err(err) => {
                session.advance(ApprovalState::Rejected, Some(err.to_string()))?;
                return Ok(session);
            }
        };
        session.advance(ApprovalState::Pending, None)?;
        match tokio::time::timeout(self.timeout, pending.answer()).await {
            Ok(Ok(ApprovalDecision::Approved)) => session.advance(ApprovalState::Approved, None)?,
            Ok(Ok(ApprovalDecision::Rejected)) => session.advance(ApprovalState::Rejected, None)?,
            Ok(Err(err)) => session.advance(ApprovalState::Rejected, Some(err.to_string()))?,
            Err(_) => session.advance(ApprovalState::TimedOut, None)?,
        }
        Ok(session)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
