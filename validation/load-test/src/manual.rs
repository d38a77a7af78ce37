//! Interactive matrix entry.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::sync::{Mutex, PoisonError};

use conv_common::{ConvError, ConvResult, Matrix};
use tracing::info;

struct InputState {
    reader: Box<dyn BufRead + Send>,
    pending: VecDeque<String>,
}

/// Reads matrix values from a line-oriented source such as stdin.
///
/// The source is locked for a whole matrix so prompts and values of
/// concurrent lifecycles never interleave.
pub struct ManualInput {
    state: Mutex<InputState>,
}

impl ManualInput {
    pub fn new(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            state: Mutex::new(InputState {
                reader: Box::new(reader),
                pending: VecDeque::new(),
            }),
        }
    }

    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }

    /// Read `rows * cols` whitespace separated values, row-major.
    ///
    /// Values may span any number of lines. Blocks until enough values were
    /// read or the input is closed. The prompt names the requesting lifecycle.
    pub fn read_matrix(
        &self,
        request_id: u64,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> ConvResult<Matrix> {
        let needed = rows * cols;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        info!(
            request_id,
            matrix = name,
            rows,
            cols,
            "Request #{}: enter {} values for {}",
            request_id,
            needed,
            name
        );

        let mut values = Vec::with_capacity(needed);
        while values.len() < needed {
            let token = next_token(&mut state)
                .map_err(|source| ConvError::Input {
                    name: name.to_string(),
                    source,
                })?
                .ok_or_else(|| ConvError::InputClosed {
                    name: name.to_string(),
                })?;
            let value = token.parse::<f32>().map_err(|_| ConvError::InvalidValue {
                name: name.to_string(),
                value: token.clone(),
            })?;
            values.push(value);
        }

        Matrix::from_flat(name, rows, cols, values)
    }
}

/// Next whitespace separated token, reading more lines as needed.
fn next_token(state: &mut InputState) -> io::Result<Option<String>> {
    loop {
        if let Some(token) = state.pending.pop_front() {
            return Ok(Some(token));
        }
        let mut line = String::new();
        if state.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        state
            .pending
            .extend(line.split_whitespace().map(str::to_string));
    }
}
