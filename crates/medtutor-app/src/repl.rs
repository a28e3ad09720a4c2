//! Terminal chat loop.
//!
//! Plain lines are sent to the model; lines starting with `/` are local
//! commands. Prose answers are printed as they stream in and structured
//! documents open their interactive driver.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

use medtutor_chat::structured;
use medtutor_chat::types::StructuredDocument;
use medtutor_chat::{ChatError, ChatOrchestrator, InteractiveSession, ProseSink, RenderedResponse};
use medtutor_core::config::UploadConfig;
use medtutor_core::types::{new_conversation_id, ImageAttachment, Role};
use medtutor_storage::ConversationStore;

use crate::study;

const HELP: &str = "\
Comandos:
  /novo              iniciar uma nova conversa
  /abrir <id>        retomar uma conversa salva
  /historico         listar conversas recentes
  /imagem <arquivo>  anexar uma imagem à próxima mensagem
  /resposta          reabrir o último quiz, flashcards ou caso clínico
  /ajuda             mostrar esta ajuda
  /sair              encerrar";

const HISTORY_LIMIT: usize = 10;

/// Prints cumulative prose renders as deltas.
///
/// Normalisation can rewrite text that was already printed; output then
/// pauses and [`TerminalSink::finish`] prints the final text in full.
struct TerminalSink<'a, W: Write> {
    out: &'a mut W,
    shown: String,
    diverged: bool,
}

impl<'a, W: Write> TerminalSink<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            shown: String::new(),
            diverged: false,
        }
    }

    fn finish(self, text: &str) -> io::Result<()> {
        match text.strip_prefix(self.shown.as_str()) {
            Some(rest) if !self.diverged => writeln!(self.out, "{}", rest)?,
            _ => writeln!(self.out, "\n\n{}", text)?,
        }
        self.out.flush()
    }
}

impl<W: Write + Send> ProseSink for TerminalSink<'_, W> {
    fn render(&mut self, cumulative: &str) {
        if self.diverged {
            return;
        }
        match cumulative.strip_prefix(self.shown.as_str()) {
            Some(rest) => {
                if write!(self.out, "{}", rest)
                    .and_then(|_| self.out.flush())
                    .is_err()
                {
                    self.diverged = true;
                }
                self.shown = cumulative.to_string();
            }
            None => self.diverged = true,
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Interactive terminal session over one orchestrator.
pub struct Repl {
    orchestrator: Arc<ChatOrchestrator>,
    store: Arc<dyn ConversationStore>,
    upload: UploadConfig,
    conversation_id: String,
    pending_images: Vec<String>,
}

impl Repl {
    pub fn new(
        orchestrator: Arc<ChatOrchestrator>,
        store: Arc<dyn ConversationStore>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            upload,
            conversation_id: new_conversation_id(),
            pending_images: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Run against the process stdin and stdout.
    pub async fn run_stdio(&mut self, resume: Option<&str>) -> io::Result<()> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut out = io::stdout();
        self.run(resume, &mut input, &mut out).await
    }

    pub async fn run<R, W>(
        &mut self,
        resume: Option<&str>,
        input: &mut Lines<R>,
        out: &mut W,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write + Send,
    {
        writeln!(out, "🩺 MedTutor. Digite /ajuda para ver os comandos.")?;
        if let Some(id) = resume {
            self.open(id, out).await?;
        }

        loop {
            let marker = if self.pending_images.is_empty() {
                String::new()
            } else {
                format!("[{} 🖼] ", self.pending_images.len())
            };
            write!(out, "\n{}> ", marker)?;
            out.flush()?;

            let Some(line) = input.next_line().await? else {
                writeln!(out)?;
                return Ok(());
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let flow = if line.starts_with('/') {
                self.command(line, input, out).await?
            } else {
                self.ask(line, input, out).await?;
                Flow::Continue
            };
            if let Flow::Quit = flow {
                return Ok(());
            }
        }
    }

    async fn command<R, W>(
        &mut self,
        line: &str,
        input: &mut Lines<R>,
        out: &mut W,
    ) -> io::Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: Write + Send,
    {
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };

        match name {
            "/sair" => return Ok(Flow::Quit),
            "/ajuda" => writeln!(out, "{}", HELP)?,
            "/novo" => {
                if let Err(e) = self.orchestrator.close(&self.conversation_id) {
                    warn!(error = %e, "Failed to close conversation");
                }
                self.conversation_id = new_conversation_id();
                self.pending_images.clear();
                writeln!(out, "Nova conversa iniciada.")?;
            }
            "/abrir" if !arg.is_empty() => self.open(arg, out).await?,
            "/historico" => {
                if let Err(e) = print_history(self.store.as_ref(), HISTORY_LIMIT, out) {
                    writeln!(out, "Erro ao listar conversas: {}", e)?;
                }
            }
            "/imagem" if !arg.is_empty() => self.attach(Path::new(arg), out).await?,
            "/resposta" => self.reopen_last(input, out).await?,
            _ => writeln!(out, "Comando desconhecido. Digite /ajuda.")?,
        }
        Ok(Flow::Continue)
    }

    async fn open<W: Write>(&mut self, id: &str, out: &mut W) -> io::Result<()> {
        match self.orchestrator.load(id).await {
            Ok(Some(turns)) => {
                self.conversation_id = id.to_string();
                self.pending_images.clear();
                writeln!(out, "Conversa {} carregada ({} mensagens).", id, turns.len())?;
                if let Some(last) = turns.iter().rev().find(|t| t.role == Role::Assistant) {
                    writeln!(out, "\nÚltima resposta:\n{}", last.content.text())?;
                }
            }
            Ok(None) => writeln!(out, "Conversa não encontrada: {}", id)?,
            Err(e) => writeln!(out, "Erro ao carregar conversa: {}", e)?,
        }
        Ok(())
    }

    async fn attach<W: Write>(&mut self, path: &Path, out: &mut W) -> io::Result<()> {
        match load_image(path, &self.upload).await {
            Ok(attachment) => {
                debug!(path = %path.display(), size = attachment.size, "Image attached");
                self.pending_images.push(attachment.data_url);
                writeln!(out, "Imagem anexada: {}", attachment.original_name)
            }
            Err(message) => writeln!(out, "{}", message),
        }
    }

    async fn ask<R, W>(&mut self, text: &str, input: &mut Lines<R>, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write + Send,
    {
        let (_, config) = self.orchestrator.preview(text);
        if let Some(status) = config.processing_status(self.pending_images.len()) {
            writeln!(out, "{}", status)?;
        }

        let images = std::mem::take(&mut self.pending_images);
        let mut sink = TerminalSink::new(out);
        let result = self
            .orchestrator
            .send(&self.conversation_id, text, &images, &mut sink)
            .await;

        let document = match result {
            Ok(outcome) => match outcome.rendered {
                RenderedResponse::Prose { text } => return sink.finish(&text),
                RenderedResponse::Document { document } => document,
            },
            Err(e @ (ChatError::EmptyMessage | ChatError::TooManyImages(_))) => {
                self.pending_images = images;
                return writeln!(sink.out, "{}", e);
            }
            Err(e) => return writeln!(sink.out, "Erro: {}", e),
        };
        drop(sink);

        open_document(document, input, out).await
    }

    async fn reopen_last<R, W>(&mut self, input: &mut Lines<R>, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let turns = match self.orchestrator.history(&self.conversation_id).await {
            Ok(turns) => turns,
            Err(e) => return writeln!(out, "Erro: {}", e),
        };
        let document = turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::Assistant)
            .find_map(|t| structured::parse(&t.content.text()));
        match document {
            Some(document) => open_document(document, input, out).await,
            None => writeln!(out, "Nenhuma resposta interativa nesta conversa."),
        }
    }
}

async fn open_document<R, W>(
    document: StructuredDocument,
    input: &mut Lines<R>,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    match InteractiveSession::start(document) {
        Ok(mut session) => study::run_session(&mut session, input, out).await,
        Err(e) => writeln!(out, "Documento inválido: {}", e),
    }
}

/// MIME type for an image path, from its extension.
fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

/// Read and encode an image file, applying the upload limits.
async fn load_image(path: &Path, limits: &UploadConfig) -> Result<ImageAttachment, String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mime_type = mime_for_path(path).unwrap_or("application/octet-stream");
    limits.check_type(mime_type).map_err(|e| e.to_string())?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Não foi possível ler {}: {}", path.display(), e))?;
    limits.check_size(bytes.len()).map_err(|e| e.to_string())?;

    Ok(ImageAttachment::new(
        STANDARD.encode(&bytes),
        mime_type,
        &name,
        bytes.len(),
    ))
}

/// Print the most recent conversations, one per line.
pub fn print_history<W: Write>(
    store: &dyn ConversationStore,
    limit: usize,
    out: &mut W,
) -> io::Result<()> {
    let list = store
        .list_recent(limit)
        .map_err(|e| io::Error::other(e.to_string()))?;
    if list.is_empty() {
        return writeln!(out, "Nenhuma conversa salva.");
    }
    for summary in list {
        writeln!(
            out,
            "{}  {}  {} ({} mensagens)",
            summary.updated_at.format("%d/%m/%Y %H:%M"),
            summary.id,
            summary.title,
            summary.message_count
        )?;
    }
    Ok(())
}
