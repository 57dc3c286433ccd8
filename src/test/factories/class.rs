//! Hand-assembled class files.

struct RawRoutine {
    access: u16,
    name: u16,
    descriptor: u16,
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
}

/// Writes a class file byte by byte. Only `Utf8` and `Class` constants are emitted.
pub struct ClassBytes {
    major: u16,
    pool: Vec<(u8, Vec<u8>)>,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<(u16, u16, u16)>,
    routines: Vec<RawRoutine>,
}

impl ClassBytes {
    /// A class extending `java/lang/Object`, version 52.
    pub fn new(name: &str) -> Self {
        let mut bytes = ClassBytes {
            major: 52,
            pool: Vec::new(),
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            routines: Vec::new(),
        };
        bytes.this_class = bytes.class(name);
        bytes.super_class = bytes.class("java/lang/Object");
        bytes
    }

    fn constant(&mut self, tag: u8, payload: Vec<u8>) -> u16 {
        if let Some(position) = self
            .pool
            .iter()
            .position(|(existing, data)| *existing == tag && *data == payload)
        {
            return position as u16 + 1;
        }
        self.pool.push((tag, payload));
        self.pool.len() as u16
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut payload = (value.len() as u16).to_be_bytes().to_vec();
        payload.extend_from_slice(value.as_bytes());
        self.constant(1, payload)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.constant(7, name.to_be_bytes().to_vec())
    }

    /// Sets the major version.
    pub fn version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    /// Adds an implemented interface.
    pub fn interface(mut self, name: &str) -> Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    /// Adds a field without attributes.
    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.fields.push((access, name, descriptor));
        self
    }

    /// Adds a routine with a `Code` attribute holding `code` and no handlers.
    pub fn routine(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        code: &[u8],
        max_stack: u16,
        max_locals: u16,
    ) -> Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.routines.push(RawRoutine {
            access,
            name,
            descriptor,
            code: code.to_vec(),
            max_stack,
            max_locals,
        });
        self
    }

    /// The finished class file.
    pub fn build(mut self) -> Vec<u8> {
        let code_name = if self.routines.is_empty() {
            0
        } else {
            self.utf8("Code")
        };

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0];
        out.extend_from_slice(&self.major.to_be_bytes());
        out.extend_from_slice(&(self.pool.len() as u16 + 1).to_be_bytes());
        for (tag, payload) in &self.pool {
            out.push(*tag);
            out.extend_from_slice(payload);
        }

        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (access, name, descriptor) in &self.fields {
            out.extend_from_slice(&access.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            out.extend_from_slice(&[0, 0]);
        }

        out.extend_from_slice(&(self.routines.len() as u16).to_be_bytes());
        for routine in &self.routines {
            out.extend_from_slice(&routine.access.to_be_bytes());
            out.extend_from_slice(&routine.name.to_be_bytes());
            out.extend_from_slice(&routine.descriptor.to_be_bytes());
            out.extend_from_slice(&[0, 1]);
            out.extend_from_slice(&code_name.to_be_bytes());
            let length = 12 + routine.code.len() as u32;
            out.extend_from_slice(&length.to_be_bytes());
            out.extend_from_slice(&routine.max_stack.to_be_bytes());
            out.extend_from_slice(&routine.max_locals.to_be_bytes());
            out.extend_from_slice(&(routine.code.len() as u32).to_be_bytes());
            out.extend_from_slice(&routine.code);
            out.extend_from_slice(&[0, 0, 0, 0]);
        }

        out.extend_from_slice(&[0, 0]);
        out
    }
}

/// An empty class `name` extending `java/lang/Object`, version 52.
pub fn minimal_class_bytes(name: &str) -> Vec<u8> {
    ClassBytes::new(name).build()
}
