// Interactive target-class selection.
use std::io::{BufRead, Write};

use crate::errors::{TrackerError, TrackerResult};
use crate::perception::types::ClassId;
use crate::targeting::selector::ClassFilter;

/// Ask until a valid choice arrives. Choices `0..n` pick a single class,
/// `n` accepts any class. End of input aborts the session.
pub fn prompt_class_filter<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    class_names: &[String],
) -> TrackerResult<ClassFilter> {
    let any_choice = class_names.len();

    writeln!(output, "\nAvailable targets:")?;
    for (idx, name) in class_names.iter().enumerate() {
        writeln!(output, "  {idx}: {name}")?;
    }
    writeln!(output, "  {any_choice}: any class")?;

    let mut line = Vec::new();
    loop {
        write!(output, "\nSelect target (0-{any_choice}): ")?;
        output.flush()?;

        // Raw bytes: a line that is not UTF-8 is just another bad answer.
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            return Err(TrackerError::Cancelled);
        }

        match String::from_utf8_lossy(&line).trim().parse::<usize>() {
            Ok(choice) if choice < any_choice => return Ok(ClassFilter::Specific(ClassId(choice))),
            Ok(choice) if choice == any_choice => return Ok(ClassFilter::Any),
            Ok(choice) => {
                tracing::debug!(choice, "selection out of range");
                writeln!(output, "Invalid choice. Please enter a number from 0 to {any_choice}.")?;
            }
            Err(_) => {
                writeln!(output, "Please enter a valid number.")?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn names() -> Vec<String> {
        vec!["class_a".into(), "class_b".into()]
    }

    fn run(input: &str) -> (TrackerResult<ClassFilter>, String) {
        let mut out = Vec::new();
        let res = prompt_class_filter(&mut Cursor::new(input.as_bytes()), &mut out, &names());
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn picks_specific_class() {
        let (res, out) = run("1\n");
        assert_eq!(res.unwrap(), ClassFilter::Specific(ClassId(1)));
        assert!(out.contains("0: class_a"));
        assert!(out.contains("2: any class"));
    }

    #[test]
    fn last_choice_means_any() {
        assert_eq!(run(" 2 \n").0.unwrap(), ClassFilter::Any);
    }

    #[test]
    fn reprompts_on_invalid_input() {
        let (res, out) = run("abc\n7\n\n0\n");
        assert_eq!(res.unwrap(), ClassFilter::Specific(ClassId(0)));
        assert_eq!(out.matches("Select target").count(), 4);
        assert_eq!(out.matches("Please enter a valid number.").count(), 2);
        assert!(out.contains("Invalid choice."));
    }

    #[test]
    fn reprompts_on_invalid_utf8() {
        let mut out = Vec::new();
        let res = prompt_class_filter(&mut Cursor::new(&b"\xff\xfe\n1\n"[..]), &mut out, &names());
        assert_eq!(res.unwrap(), ClassFilter::Specific(ClassId(1)));
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Please enter a valid number.").count(), 1);
        assert_eq!(out.matches("Select target").count(), 2);
    }

    #[test]
    fn end_of_input_cancels() {
        assert!(matches!(run("x\n").0, Err(TrackerError::Cancelled)));
    }
}
