//! The list program: reads one byte commands, keeps a list of integers in a
//! [`Heap`] and prints a report once the commands run out.
//!
//! | Byte | Command                                             |
//! |------|-----------------------------------------------------|
//! | `a`  | append the counter to the list                      |
//! | `b`  | nothing besides counting                            |
//! | `c`  | remove the most recently appended value, if any     |
//!
//! Every command increments the counter after doing its work. Any other byte
//! or the end of the input stops the program.

use std::io::{self, Read, Write};

use crate::{collection::HeapList, error::ProgramError, heap::Heap};

/// A recognised input byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `a`
    Append,
    /// `b`
    Increment,
    /// `c`
    RemoveLast,
}

impl Command {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'a' => Some(Self::Append),
            b'b' => Some(Self::Increment),
            b'c' => Some(Self::RemoveLast),
            _ => None,
        }
    }
}

/// Iterator over the commands of a byte stream. Ends at the first byte that
/// is not a command or at the end of the stream. The reader is consumed one
/// byte at a time, so nothing past the terminating byte is read.
pub struct Commands<R> {
    input: R,
    done: bool,
}

impl<R: Read> Commands<R> {
    pub fn new(input: R) -> Self {
        Self { input, done: false }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0];

        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    tracing::warn!(%err, "input error, treating it as end of input");
                    return None;
                }
            }
        }
    }
}

impl<R: Read> Iterator for Commands<R> {
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        if self.done {
            return None;
        }

        let command = self.read_byte().and_then(Command::from_byte);
        self.done = command.is_none();

        command
    }
}

/// What the program printed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Number of commands processed.
    pub count: u64,
    /// Values left in the list, oldest first.
    pub values: Vec<u64>,
}

/// Runs the program over `input`, writing the report to `output`:
///
/// ```text
/// Count: <n>
/// Collection: <v1>,<v2>,...,<vk>
/// ```
///
/// Appends that don't fit in the heap are dropped with a warning. Whatever
/// remains in the list is released before returning.
///
/// # Examples
///
/// ```rust
/// use nextfit::{program, Heap};
///
/// let mut heap = Heap::new(vec![0u8; 4096]);
/// let mut output = Vec::new();
///
/// let summary = program::run(&mut heap, &b"aaab"[..], &mut output).unwrap();
///
/// assert_eq!(summary.count, 4);
/// assert_eq!(output, b"Count: 4\nCollection: 0,1,2\n");
/// ```
pub fn run<S, R, W>(heap: &mut Heap<S>, input: R, mut output: W) -> Result<Summary, ProgramError>
where
    S: AsRef<[u8]> + AsMut<[u8]>,
    R: Read,
    W: Write,
{
    let mut list = HeapList::new();
    let mut count = 0u64;

    for command in Commands::new(input) {
        match command {
            Command::Append => {
                if let Err(err) = list.push_back(heap, count) {
                    tracing::warn!(%err, value = count, "append dropped");
                }
            }
            Command::Increment => {}
            Command::RemoveLast => {
                list.pop_back(heap)?;
            }
        }

        count += 1;
    }

    let values = list.values(heap).collect::<Result<Vec<_>, _>>()?;
    list.clear(heap)?;

    write_report(&mut output, count, &values)?;

    Ok(Summary { count, values })
}

fn write_report<W: Write>(output: &mut W, count: u64, values: &[u64]) -> io::Result<()> {
    writeln!(output, "Count: {count}")?;
    write!(output, "Collection: ")?;

    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(output, ",")?;
        }
        write!(output, "{value}")?;
    }

    writeln!(output)?;
    output.flush()
}
