use std::io;

/// Line-oriented console used by the interactive chat.
pub trait Terminal {
    fn read_line(&mut self) -> io::Result<String>;
    fn write(&mut self, text: &str) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    /// Show `label` and read one trimmed line. `None` means end of input.
    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        self.write(label)?;
        self.flush()?;
        match self.read_line() {
            Ok(line) if line.is_empty() => Ok(None),
            Ok(line) => Ok(Some(line.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.write(text)?;
        self.write("\n")
    }
}

pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn read_line(&mut self) -> io::Result<String> {
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input)
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        print!("{text}");
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        use io::Write;
        io::stdout().flush()
    }
}

#[cfg(test)]
pub struct MockTerminal {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    input_index: usize,
}

#[cfg(test)]
impl MockTerminal {
    pub fn new(inputs: Vec<&str>) -> Self {
        Self {
            inputs: inputs.into_iter().map(|s| format!("{s}\n")).collect(),
            outputs: Vec::new(),
            input_index: 0,
        }
    }

    pub fn output(&self) -> String {
        self.outputs.concat()
    }
}

#[cfg(test)]
impl Terminal for MockTerminal {
    fn read_line(&mut self) -> io::Result<String> {
        if self.input_index < self.inputs.len() {
            let input = self.inputs[self.input_index].clone();
            self.input_index += 1;
            Ok(input)
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "No more inputs",
            ))
        }
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        self.outputs.push(text.to_string());
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
