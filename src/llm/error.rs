//! Tipos de erro para o cliente de geração.
//!
//! Define [`GenerationError`] com duas famílias de falha: transporte (rede ou
//! timeout) e erro do serviço. Nenhuma retentativa acontece nesta camada.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Network failure or timeout (DNS, refused connection, deadline exceeded).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status, or a success status whose body is not a usable
    /// completion.
    #[error("service error (status {status}): {message}")]
    Service { status: u16, message: String },
}

impl GenerationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Transport(e) if e.is_timeout())
    }
}
