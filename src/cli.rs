//! Interface de linha de comando do chartwright baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (submit, config)
//! e flags globais (--config, --verbose, --log-json).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// chartwright: pipeline assíncrono de geração de gráficos.
#[derive(Debug, Parser)]
#[command(name = "chartwright", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./chartwright.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emite logs em JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,
}

/// Caminho de execução do job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Executa no próprio processo e espera o resultado.
    #[default]
    Sync,
    /// Envia ao pool de workers e acompanha por polling.
    Async,
    /// Publica na fila durável e acompanha por polling.
    Queued,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submete um job de análise e imprime o resultado final.
    Submit {
        /// Identificador de quem submete (chave do rate limit).
        #[arg(long)]
        owner: String,

        /// Objetivo da análise.
        #[arg(long)]
        goal: String,

        /// Nome de exibição do gráfico.
        #[arg(long)]
        name: Option<String>,

        /// Tipo de gráfico sugerido (ex.: bar, line, pie).
        #[arg(long)]
        chart_type: Option<String>,

        /// Arquivo com os dados tabulares (CSV em texto).
        #[arg(long)]
        data: PathBuf,

        #[arg(long, value_enum, default_value_t = Mode::Sync)]
        mode: Mode,
    },

    /// Mostra a configuração efetiva.
    Config,
}
