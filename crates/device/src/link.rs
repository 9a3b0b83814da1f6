//! Gate one-shot de link pronto.
//!
//! As threads que transmitem esperam aqui o sinal único de que a rede está
//! de pé antes do primeiro envio. Uma vez sinalizado, todo `wait()` futuro
//! retorna imediatamente.

use std::sync::{Condvar, Mutex};

/// Evento one-shot: `signal()` libera todos os `wait()` presentes e futuros.
pub struct LinkGate {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl LinkGate {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Marca o link como pronto. Chamado uma única vez pelo bootstrap.
    pub fn signal(&self) {
        let mut ready = self.ready.lock().unwrap();
        *ready = true;
        self.cond.notify_all();
    }

    /// Bloqueia até o gate ser sinalizado.
    pub fn wait(&self) {
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            ready = self.cond.wait(ready).unwrap();
        }
    }
}

impl Default for LinkGate {
    fn default() -> Self {
        Self::new()
    }
}
