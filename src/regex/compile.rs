use crate::error::PatternError;

use super::atom::Atom;
use super::parse::{Assertion, Ast, Node};

/// Upper bound on compiled program length. Nested counted repetitions
/// multiply, so `(a{1000}){1000}` is rejected here rather than at parse time.
pub const MAX_PROGRAM_LEN: usize = 100_000;

/// One step of the backtracking program. `pc` values index `Program::insts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// End of the program or of a lookahead body.
    Match,
    Atom(Atom),
    Assert(Assertion),
    /// Try `primary` first; `secondary` is resumed on backtrack.
    Split {
        primary: usize,
        secondary: usize,
    },
    Jump(usize),
    GroupStart(usize),
    GroupEnd(usize),
    Backref(usize),
    /// Run `body` (terminated by its own `Match`) as an atomic zero-width test,
    /// then continue at `next`.
    LookAhead {
        negated: bool,
        body: usize,
        next: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Program {
    pub insts: Vec<Inst>,
    pub groups: usize,
    pub has_backrefs: bool,
    /// Set when every match must begin with this ASCII byte; lets unanchored
    /// search skip ahead with `memchr`.
    pub first_byte: Option<u8>,
    /// Set when the program can only match at offset 0.
    pub anchored_start: bool,
}

pub fn compile(ast: &Ast) -> Result<Program, PatternError> {
    let mut compiler = Compiler { insts: Vec::new() };
    compiler.emit(&ast.root)?;
    compiler.push(Inst::Match)?;

    let insts = compiler.insts;
    let has_backrefs = insts.iter().any(|i| matches!(i, Inst::Backref(_)));
    let first_byte = match insts.first() {
        Some(Inst::Atom(Atom::Literal(c))) if c.is_ascii() => u8::try_from(*c).ok(),
        _ => None,
    };
    let anchored_start = matches!(insts.first(), Some(Inst::Assert(Assertion::Start)));

    log::debug!(
        "compiled {} instructions, {} groups, backrefs: {has_backrefs}",
        insts.len(),
        ast.groups
    );

    Ok(Program {
        insts,
        groups: ast.groups,
        has_backrefs,
        first_byte,
        anchored_start,
    })
}

struct Compiler {
    insts: Vec<Inst>,
}

impl Compiler {
    fn push(&mut self, inst: Inst) -> Result<usize, PatternError> {
        if self.insts.len() >= MAX_PROGRAM_LEN {
            return Err(PatternError::ProgramTooLarge {
                size: self.insts.len() + 1,
                limit: MAX_PROGRAM_LEN,
            });
        }
        self.insts.push(inst);
        Ok(self.insts.len() - 1)
    }

    fn pc(&self) -> usize {
        self.insts.len()
    }

    // Split targets are filled in once both branches have been emitted.
    fn hole(&mut self) -> Result<usize, PatternError> {
        self.push(Inst::Split {
            primary: 0,
            secondary: 0,
        })
    }

    fn patch_split(&mut self, at: usize, take: usize, skip: usize, greedy: bool) {
        let (primary, secondary) = if greedy { (take, skip) } else { (skip, take) };
        self.insts[at] = Inst::Split { primary, secondary };
    }

    fn emit(&mut self, node: &Node) -> Result<(), PatternError> {
        match node {
            Node::Empty => {}
            Node::Atom(atom) => {
                self.push(Inst::Atom(atom.clone()))?;
            }
            Node::Assert(assertion) => {
                self.push(Inst::Assert(*assertion))?;
            }
            Node::Backref(index) => {
                self.push(Inst::Backref(*index))?;
            }
            Node::Group { index, node } => {
                self.push(Inst::GroupStart(*index))?;
                self.emit(node)?;
                self.push(Inst::GroupEnd(*index))?;
            }
            Node::NonCapturing(node) => self.emit(node)?,
            Node::LookAhead { negated, node } => {
                let at = self.push(Inst::LookAhead {
                    negated: *negated,
                    body: 0,
                    next: 0,
                })?;
                self.emit(node)?;
                self.push(Inst::Match)?;
                self.insts[at] = Inst::LookAhead {
                    negated: *negated,
                    body: at + 1,
                    next: self.pc(),
                };
            }
            Node::Concat(nodes) => {
                for node in nodes {
                    self.emit(node)?;
                }
            }
            Node::Alternate(branches) => self.alternate(branches)?,
            Node::Repeat {
                node,
                min,
                max,
                greedy,
            } => self.repeat(node, *min, *max, *greedy)?,
        }
        Ok(())
    }

    // A|B|C is split pairwise: A, else (B, else C).
    fn alternate(&mut self, branches: &[Node]) -> Result<(), PatternError> {
        let Some((last, rest)) = branches.split_last() else {
            return Ok(());
        };
        let mut exits = Vec::with_capacity(rest.len());
        for branch in rest {
            let split = self.hole()?;
            self.emit(branch)?;
            exits.push(self.push(Inst::Jump(0))?);
            let next = self.pc();
            self.patch_split(split, split + 1, next, true);
        }
        self.emit(last)?;
        let end = self.pc();
        for exit in exits {
            self.insts[exit] = Inst::Jump(end);
        }
        Ok(())
    }

    // x{m,n}: m mandatory copies, then n-m optional copies that all exit to
    // the same place. x{m,}: m copies, then a loop.
    fn repeat(
        &mut self,
        node: &Node,
        min: u32,
        max: Option<u32>,
        greedy: bool,
    ) -> Result<(), PatternError> {
        for _ in 0..min {
            self.emit(node)?;
        }
        match max {
            None => {
                let split = self.hole()?;
                self.emit(node)?;
                self.push(Inst::Jump(split))?;
                let exit = self.pc();
                self.patch_split(split, split + 1, exit, greedy);
            }
            Some(max) => {
                let mut splits = Vec::new();
                for _ in min..max {
                    splits.push(self.hole()?);
                    self.emit(node)?;
                }
                let exit = self.pc();
                for split in splits {
                    self.patch_split(split, split + 1, exit, greedy);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::parse::parse;

    fn program(pattern: &str) -> Program {
        compile(&parse(pattern).unwrap()).unwrap()
    }

    #[test]
    fn literal_program() {
        let prog = program("ab");
        assert_eq!(
            prog.insts,
            vec![
                Inst::Atom(Atom::Literal('a')),
                Inst::Atom(Atom::Literal('b')),
                Inst::Match,
            ]
        );
        assert_eq!(prog.first_byte, Some(b'a'));
        assert!(!prog.anchored_start);
    }

    #[test]
    fn greedy_and_lazy_star_differ_only_in_split_order() {
        let greedy = program("a*");
        assert_eq!(
            greedy.insts[0],
            Inst::Split {
                primary: 1,
                secondary: 3
            }
        );
        let lazy = program("a*?");
        assert_eq!(
            lazy.insts[0],
            Inst::Split {
                primary: 3,
                secondary: 1
            }
        );
        assert_eq!(greedy.insts[2], Inst::Jump(0));
    }

    #[test]
    fn counted_repeat_unrolls() {
        let prog = program("a{2,3}");
        assert_eq!(
            prog.insts,
            vec![
                Inst::Atom(Atom::Literal('a')),
                Inst::Atom(Atom::Literal('a')),
                Inst::Split {
                    primary: 3,
                    secondary: 4
                },
                Inst::Atom(Atom::Literal('a')),
                Inst::Match,
            ]
        );
    }

    #[test]
    fn alternation_jumps_to_common_exit() {
        let prog = program("a|b|c");
        assert_eq!(
            prog.insts,
            vec![
                Inst::Split {
                    primary: 1,
                    secondary: 3
                },
                Inst::Atom(Atom::Literal('a')),
                Inst::Jump(7),
                Inst::Split {
                    primary: 4,
                    secondary: 6
                },
                Inst::Atom(Atom::Literal('b')),
                Inst::Jump(7),
                Inst::Atom(Atom::Literal('c')),
                Inst::Match,
            ]
        );
    }

    #[test]
    fn groups_and_backrefs() {
        let prog = program(r"(a)\1");
        assert_eq!(
            prog.insts,
            vec![
                Inst::GroupStart(1),
                Inst::Atom(Atom::Literal('a')),
                Inst::GroupEnd(1),
                Inst::Backref(1),
                Inst::Match,
            ]
        );
        assert!(prog.has_backrefs);
        assert_eq!(prog.groups, 1);
    }

    #[test]
    fn lookahead_body_is_self_terminated() {
        let prog = program("a(?!b)");
        assert_eq!(
            prog.insts,
            vec![
                Inst::Atom(Atom::Literal('a')),
                Inst::LookAhead {
                    negated: true,
                    body: 2,
                    next: 4
                },
                Inst::Atom(Atom::Literal('b')),
                Inst::Match,
                Inst::Match,
            ]
        );
    }

    #[test]
    fn anchored_start_detected() {
        assert!(program("^abc").anchored_start);
        assert_eq!(program("^abc").first_byte, None);
    }

    #[test]
    fn oversized_program_rejected() {
        let ast = parse("(a{1000}){1000}").unwrap();
        assert!(matches!(
            compile(&ast),
            Err(PatternError::ProgramTooLarge { .. })
        ));
    }
}
