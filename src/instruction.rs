use crate::value::Value;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// One decoded instruction, as supplied by the runtime for the current event.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub mnemonic: String,
    /// Symbolic operand, e.g. a referenced identifier.
    pub name_operand: Option<Value>,
    /// Literal operand.
    pub const_operand: Option<Value>,
}

impl Instruction {
    pub fn new(offset: usize, mnemonic: &str) -> Self {
        Self {
            offset,
            mnemonic: mnemonic.into(),
            name_operand: None,
            const_operand: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<Value>) -> Self {
        self.name_operand = Some(name.into());
        self
    }

    pub fn with_const(mut self, value: impl Into<Value>) -> Self {
        self.const_operand = Some(value.into());
        self
    }
}

/// Renders `"<mnemonic> <name-field> <const-field>"`.
///
/// Absent operands leave their field empty, so the separating spaces stay.
/// No record at all renders as the empty string.
pub fn format_instruction(instr: Option<&Instruction>) -> String {
    let Some(instr) = instr else {
        return String::new();
    };
    let name = match &instr.name_operand {
        Some(v) => format!("#{}", v),
        None => String::new(),
    };
    let value = match &instr.const_operand {
        Some(v) => format!("${}", v),
        None => String::new(),
    };
    format!("{} {} {}", instr.mnemonic, name, value)
}

/// Bytecode dump of a code unit, one `^0x<offset>@<name>\t<instr>` line each.
pub fn format_listing(name: &str, instructions: &[Instruction]) -> Vec<String> {
    instructions
        .iter()
        .map(|instr| {
            format!(
                "^0x{:04x}@{}\t{}",
                instr.offset,
                name,
                format_instruction(Some(instr))
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_const_only() {
        let instr = Instruction::new(0, "LOAD_CONST").with_const(999);
        assert_eq!(format_instruction(Some(&instr)), "LOAD_CONST  $999");
    }

    #[test]
    fn test_name_only_has_no_const_segment() {
        let instr = Instruction::new(4, "LOAD_NAME").with_name("print");
        let text = format_instruction(Some(&instr));
        assert_eq!(text, "LOAD_NAME #'print' ");
        assert!(!text.contains('$'));
    }

    #[test]
    fn test_both_and_neither() {
        let both = Instruction::new(0, "LOAD_CONST_STRING")
            .with_name(7)
            .with_const("hi");
        assert_eq!(format_instruction(Some(&both)), "LOAD_CONST_STRING #7 $'hi'");

        let bare = Instruction::new(2, "RETURN_VALUE");
        assert_eq!(format_instruction(Some(&bare)), "RETURN_VALUE  ");
    }

    #[test]
    fn test_absent_record() {
        assert_eq!(format_instruction(None), "");
    }

    #[test]
    fn test_is_deterministic() {
        let instr = Instruction::new(0, "BINARY_OP").with_const(26);
        assert_eq!(
            format_instruction(Some(&instr)),
            format_instruction(Some(&instr.clone()))
        );
    }

    #[test]
    fn test_listing() {
        let code = vec![
            Instruction::new(0, "LOAD_FAST").with_const(0),
            Instruction::new(0x12, "RETURN_VALUE"),
        ];
        assert_eq!(
            format_listing("do", &code),
            vec!["^0x0000@do\tLOAD_FAST  $0", "^0x0012@do\tRETURN_VALUE  "]
        );
    }
}
