//! Interface de terminal do chartwright: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner enquanto o job é acompanhado e
//! `console` para estilização com cores. O [`JobProgress`] mostra o estado do
//! job até ele chegar a um estado terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use chartwright::job::{Job, JobStatus};

/// Indicador visual de progresso para um job no terminal.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com a descrição do job.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(description.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem do spinner com o status observado.
    pub fn update(&self, job: &Job) {
        self.pb
            .set_message(format!("{} {}", job.id, self.status_style(job.status).apply_to(job.status)));
    }

    pub fn note(&self, message: &str) {
        self.pb
            .println(format!("  {} {message}", self.yellow.apply_to("•")));
    }

    /// Finaliza o spinner e exibe o resultado final do job.
    pub fn complete(&self, job: &Job) {
        self.pb.finish_and_clear();
        match job.status {
            JobStatus::Done => {
                println!("  {} Job {} done", self.green.apply_to("✓"), job.id);
            }
            JobStatus::Failed => {
                println!(
                    "  {} Job {} failed: {}",
                    self.red.apply_to("✗"),
                    job.id,
                    job.failure_detail.as_deref().unwrap_or("unknown error")
                );
            }
            status => {
                println!("  {} Job {} is still {status}", self.yellow.apply_to("…"), job.id);
            }
        }
    }

    /// Finaliza o spinner quando o job nem chegou a ser acompanhado.
    pub fn abort(&self, reason: &str) {
        self.pb.finish_and_clear();
        println!("  {} {reason}", self.red.apply_to("✗"));
    }

    /// Imprime o job formatado em JSON com estilo colorido.
    pub fn print_job(&self, job: &Job) {
        println!();
        println!("{}", self.status_style(job.status).apply_to("─── Job ───"));
        println!("{}", serde_json::to_string_pretty(job).unwrap_or_default());
    }

    fn status_style(&self, status: JobStatus) -> &Style {
        match status {
            JobStatus::Done => &self.green,
            JobStatus::Failed => &self.red,
            _ => &self.yellow,
        }
    }
}
