use crate::ast;
use crate::ir::context::{CodeContext, Fixup};
use crate::ir::{Instruction, Op, Operand, Program, Target, VirtualRegister};
use crate::{CompileError, NodeKind};

/// Largest array a declaration may reserve. Every slot costs one `push`.
pub const MAX_ARRAY_SIZE: usize = 1 << 16;

/// Lowers a whole program into a linear instruction sequence ending in `exit`.
pub fn lower(prog: &ast::Program) -> Result<Program, CompileError> {
    let mut ctx = CodeContext::new();

    log::debug!(
        "lowering {} declaration(s) and {} statement(s)",
        prog.data.len(),
        prog.main.len()
    );

    for decl in &prog.data {
        lower_declaration(&mut ctx, decl)?;
    }
    lower_block(&mut ctx, &prog.main)?;
    ctx.emit(Instruction::new(Op::Exit, vec![]));

    ctx.finish()
}

fn lower_declaration(ctx: &mut CodeContext, decl: &ast::Declaration) -> Result<(), CompileError> {
    match decl {
        ast::Declaration::Variable { name } => {
            let slot = ctx.reserve_slots(1);
            ctx.bind(name, slot);
        }

        ast::Declaration::Array { name, size } => {
            let count = parse_array_size(size)?;
            let slot = ctx.reserve_slots(count);
            ctx.bind(name, slot);
        }
    }
    Ok(())
}

// Sizes share the `i32` range of numeric literals, bounded by MAX_ARRAY_SIZE
fn parse_array_size(size: &ast::Numeric) -> Result<usize, CompileError> {
    size.text()
        .parse::<i32>()
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n <= MAX_ARRAY_SIZE)
        .ok_or_else(|| CompileError::MalformedLiteral {
            text: size.text().to_string(),
            node: NodeKind::ArrayDecl,
        })
}

fn lower_block(ctx: &mut CodeContext, block: &ast::Block) -> Result<(), CompileError> {
    for stmt in block {
        lower_statement(ctx, stmt)?;
    }
    Ok(())
}

fn lower_statement(ctx: &mut CodeContext, stmt: &ast::Statement) -> Result<(), CompileError> {
    match stmt {
        ast::Statement::AssignVariable { name, value } => {
            let value_reg = lower_expression(ctx, value)?;
            let slot = ctx.slot_of(name, NodeKind::AssignVariable)?;
            ctx.emit(Instruction::new(
                Op::Storei,
                vec![Operand::Slot(slot), value_reg.into()],
            ));
        }

        ast::Statement::AssignElement { name, subscript, value } => {
            let value_reg = lower_expression(ctx, value)?;
            let addr_reg = lower_element_address(ctx, name, subscript, NodeKind::AssignElement)?;
            ctx.emit(Instruction::new(
                Op::Store,
                vec![addr_reg.into(), value_reg.into()],
            ));
        }

        ast::Statement::Increment { name } => {
            lower_step(ctx, name, Op::Inc, NodeKind::Increment)?;
        }

        ast::Statement::Decrement { name } => {
            lower_step(ctx, name, Op::Dec, NodeKind::Decrement)?;
        }

        ast::Statement::If { cond, then_block, else_block } => {
            lower_comparison(ctx, cond)?;
            let skip_then = emit_branch(ctx, Op::Jnt);

            lower_block(ctx, then_block)?;

            match else_block {
                None => {
                    let after = ctx.position();
                    ctx.resolve(skip_then, after);
                }
                Some(else_block) => {
                    let skip_else = emit_branch(ctx, Op::Jmp);

                    let else_start = ctx.position();
                    ctx.resolve(skip_then, else_start);

                    lower_block(ctx, else_block)?;

                    let after = ctx.position();
                    ctx.resolve(skip_else, after);
                }
            }
        }

        ast::Statement::While { cond, body } => {
            let head = ctx.position();
            lower_comparison(ctx, cond)?;
            let exit = emit_branch(ctx, Op::Jnt);

            lower_block(ctx, body)?;

            // Backward target is already known, no placeholder needed
            let back_reg = ctx.new_register();
            ctx.emit(Instruction::new(
                Op::Movi,
                vec![back_reg.into(), Operand::Address(head)],
            ));
            ctx.emit(Instruction::new(Op::Jmp, vec![back_reg.into()]));

            let after = ctx.position();
            ctx.resolve(exit, after);
        }

        ast::Statement::PenUp => {
            ctx.emit(Instruction::new(Op::PenUp, vec![]));
        }

        ast::Statement::PenDown => {
            ctx.emit(Instruction::new(Op::PenDown, vec![]));
        }

        ast::Statement::SetPosition { x, y } => {
            let x_reg = lower_expression(ctx, x)?;
            let y_reg = lower_expression(ctx, y)?;
            emit_move(ctx, Target::X, x_reg);
            emit_move(ctx, Target::Y, y_reg);
        }

        ast::Statement::SetColor { color } => {
            let color_reg = lower_expression(ctx, color)?;
            emit_move(ctx, Target::Color, color_reg);
        }

        ast::Statement::Forward { distance } => {
            let reg = lower_expression(ctx, distance)?;
            ctx.emit(Instruction::new(Op::Fwd, vec![reg.into()]));
        }

        ast::Statement::Back { distance } => {
            let reg = lower_expression(ctx, distance)?;
            ctx.emit(Instruction::new(Op::Back, vec![reg.into()]));
        }

        ast::Statement::Rotate { angle } => {
            let reg = lower_expression(ctx, angle)?;
            // Rotation accumulates: tr = tr + angle
            ctx.emit(Instruction::new(
                Op::Add,
                vec![
                    Operand::Target(Target::Rotation),
                    Operand::Target(Target::Rotation),
                    reg.into(),
                ],
            ));
        }
    }
    Ok(())
}

fn lower_expression(
    ctx: &mut CodeContext,
    expr: &ast::Expr,
) -> Result<VirtualRegister, CompileError> {
    match expr {
        ast::Expr::Numeric { value } => {
            let imm: i32 = value
                .text()
                .parse()
                .map_err(|_| CompileError::MalformedLiteral {
                    text: value.text().to_string(),
                    node: NodeKind::NumericExpr,
                })?;

            let dest = ctx.new_register();
            ctx.emit(Instruction::new(
                Op::Movi,
                vec![dest.into(), Operand::Immediate(imm)],
            ));
            Ok(dest)
        }

        ast::Expr::Variable { name } => {
            let slot = ctx.slot_of(name, NodeKind::VariableExpr)?;
            let dest = ctx.new_register();
            ctx.emit(Instruction::new(
                Op::Loadi,
                vec![dest.into(), Operand::Slot(slot)],
            ));
            Ok(dest)
        }

        ast::Expr::Binary { op, left, right } => {
            let left_reg = lower_expression(ctx, left)?;
            let right_reg = lower_expression(ctx, right)?;

            let ir_op = match op {
                ast::BinaryOp::Add => Op::Add,
                ast::BinaryOp::Sub => Op::Sub,
                ast::BinaryOp::Mul => Op::Mul,
                ast::BinaryOp::Div => Op::Div,
            };

            let dest = ctx.new_register();
            ctx.emit(Instruction::new(
                ir_op,
                vec![dest.into(), left_reg.into(), right_reg.into()],
            ));
            Ok(dest)
        }

        ast::Expr::Element { name, subscript } => {
            let addr_reg = lower_element_address(ctx, name, subscript, NodeKind::ElementExpr)?;
            let dest = ctx.new_register();
            ctx.emit(Instruction::new(Op::Load, vec![dest.into(), addr_reg.into()]));
            Ok(dest)
        }
    }
}

// Leaves the outcome in the implicit condition flag consumed by the next branch.
fn lower_comparison(ctx: &mut CodeContext, cmp: &ast::Comparison) -> Result<(), CompileError> {
    let left_reg = lower_expression(ctx, &cmp.left)?;
    let right_reg = lower_expression(ctx, &cmp.right)?;

    let ir_op = match cmp.op {
        ast::CompareOp::Equal => Op::Cmpeq,
        ast::CompareOp::Less => Op::Cmplt,
    };
    ctx.emit(Instruction::new(ir_op, vec![left_reg.into(), right_reg.into()]));
    Ok(())
}

/// Computes `base + subscript` at run time and returns the register holding
/// the element address.
fn lower_element_address(
    ctx: &mut CodeContext,
    name: &str,
    subscript: &ast::Expr,
    node: NodeKind,
) -> Result<VirtualRegister, CompileError> {
    let index_reg = lower_expression(ctx, subscript)?;
    let base = ctx.slot_of(name, node)?;

    let base_reg = ctx.new_register();
    ctx.emit(Instruction::new(
        Op::Movi,
        vec![base_reg.into(), Operand::Slot(base)],
    ));

    let addr_reg = ctx.new_register();
    ctx.emit(Instruction::new(
        Op::Add,
        vec![addr_reg.into(), base_reg.into(), index_reg.into()],
    ));
    Ok(addr_reg)
}

fn lower_step(
    ctx: &mut CodeContext,
    name: &str,
    op: Op,
    node: NodeKind,
) -> Result<(), CompileError> {
    let slot = ctx.slot_of(name, node)?;
    let reg = ctx.new_register();

    ctx.emit(Instruction::new(Op::Loadi, vec![reg.into(), Operand::Slot(slot)]));
    ctx.emit(Instruction::new(op, vec![reg.into()]));
    ctx.emit(Instruction::new(Op::Storei, vec![Operand::Slot(slot), reg.into()]));
    Ok(())
}

/// `movi %t,??` followed by `jnt %t` or `jmp %t`.
fn emit_branch(ctx: &mut CodeContext, op: Op) -> Fixup {
    let target_reg = ctx.new_register();
    let fixup = ctx.emit_placeholder(target_reg);
    ctx.emit(Instruction::new(op, vec![target_reg.into()]));
    fixup
}

fn emit_move(ctx: &mut CodeContext, target: Target, src: VirtualRegister) {
    ctx.emit(Instruction::new(
        Op::Mov,
        vec![Operand::Target(target), src.into()],
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, CompareOp, Comparison, Declaration, Expr, Numeric, Statement};

    fn var(name: &str) -> Declaration {
        Declaration::Variable { name: name.to_string() }
    }

    fn listing(program: &Program) -> Vec<String> {
        program.instructions.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_empty_program_is_single_exit() {
        let prog = ast::Program { data: vec![], main: vec![] };
        let program = lower(&prog).unwrap();
        assert_eq!(listing(&program), vec!["exit"]);
    }

    #[test]
    fn test_binary_expression_evaluates_left_first() {
        let prog = ast::Program {
            data: vec![var("a")],
            main: vec![Statement::AssignVariable {
                name: "a".to_string(),
                value: Expr::binary(BinaryOp::Sub, Expr::num("10"), Expr::var("a")),
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "push r0",
                "movi %0,10",
                "loadi %1,0",
                "sub %2,%0,%1",
                "storei 0,%2",
                "exit",
            ]
        );
    }

    #[test]
    fn test_array_element_load_uses_runtime_add() {
        let prog = ast::Program {
            data: vec![
                var("i"),
                Declaration::Array {
                    name: "xs".to_string(),
                    size: Numeric::new("3"),
                },
            ],
            main: vec![Statement::Forward {
                distance: Expr::element("xs", Expr::var("i")),
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "push r0",
                "push r0",
                "push r0",
                "push r0",
                "loadi %0,0",
                "movi %1,1",
                "add %2,%1,%0",
                "load %3,%2",
                "fwd %3",
                "exit",
            ]
        );
    }

    #[test]
    fn test_array_element_store_lowers_value_first() {
        let prog = ast::Program {
            data: vec![Declaration::Array {
                name: "xs".to_string(),
                size: Numeric::new("2"),
            }],
            main: vec![Statement::AssignElement {
                name: "xs".to_string(),
                subscript: Expr::num("1"),
                value: Expr::num("9"),
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "push r0",
                "push r0",
                "movi %0,9",
                "movi %1,1",
                "movi %2,0",
                "add %3,%2,%1",
                "store %3,%0",
                "exit",
            ]
        );
    }

    #[test]
    fn test_increment_and_decrement_share_one_register() {
        let prog = ast::Program {
            data: vec![var("a"), var("b")],
            main: vec![
                Statement::Increment { name: "b".to_string() },
                Statement::Decrement { name: "a".to_string() },
            ],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "push r0",
                "push r0",
                "loadi %0,1",
                "inc %0",
                "storei 1,%0",
                "loadi %1,0",
                "dec %1",
                "storei 0,%1",
                "exit",
            ]
        );
    }

    #[test]
    fn test_if_without_else() {
        let prog = ast::Program {
            data: vec![],
            main: vec![Statement::If {
                cond: Comparison::new(CompareOp::Equal, Expr::num("1"), Expr::num("2")),
                then_block: vec![Statement::PenDown],
                else_block: None,
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "movi %0,1",
                "movi %1,2",
                "cmpeq %0,%1",
                "movi %2,6",
                "jnt %2",
                "pendown",
                "exit",
            ]
        );
    }

    #[test]
    fn test_if_with_else() {
        let prog = ast::Program {
            data: vec![],
            main: vec![Statement::If {
                cond: Comparison::new(CompareOp::Less, Expr::num("1"), Expr::num("2")),
                then_block: vec![Statement::PenDown],
                else_block: Some(vec![Statement::PenUp, Statement::PenDown]),
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "movi %0,1",
                "movi %1,2",
                "cmplt %0,%1",
                "movi %2,8",
                "jnt %2",
                "pendown",
                "movi %3,10",
                "jmp %3",
                "penup",
                "pendown",
                "exit",
            ]
        );
    }

    #[test]
    fn test_empty_else_still_jumps_over_it() {
        let prog = ast::Program {
            data: vec![],
            main: vec![Statement::If {
                cond: Comparison::new(CompareOp::Less, Expr::num("1"), Expr::num("2")),
                then_block: vec![],
                else_block: Some(vec![]),
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "movi %0,1",
                "movi %1,2",
                "cmplt %0,%1",
                "movi %2,7",
                "jnt %2",
                "movi %3,7",
                "jmp %3",
                "exit",
            ]
        );
    }

    #[test]
    fn test_nested_while_targets() {
        // while (a < 2) { while (b < 3) { b++ } a++ }
        let inner = Statement::While {
            cond: Comparison::new(CompareOp::Less, Expr::var("b"), Expr::num("3")),
            body: vec![Statement::Increment { name: "b".to_string() }],
        };
        let prog = ast::Program {
            data: vec![var("a"), var("b")],
            main: vec![Statement::While {
                cond: Comparison::new(CompareOp::Less, Expr::var("a"), Expr::num("2")),
                body: vec![inner, Statement::Increment { name: "a".to_string() }],
            }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "push r0",
                "push r0",
                "loadi %0,0",
                "movi %1,2",
                "cmplt %0,%1",
                "movi %2,22",
                "jnt %2",
                "loadi %3,1",
                "movi %4,3",
                "cmplt %3,%4",
                "movi %5,17",
                "jnt %5",
                "loadi %6,1",
                "inc %6",
                "storei 1,%6",
                "movi %7,7",
                "jmp %7",
                "loadi %8,0",
                "inc %8",
                "storei 0,%8",
                "movi %9,2",
                "jmp %9",
                "exit",
            ]
        );
    }

    #[test]
    fn test_turtle_statements() {
        let prog = ast::Program {
            data: vec![],
            main: vec![
                Statement::PenUp,
                Statement::SetPosition { x: Expr::num("4"), y: Expr::num("5") },
                Statement::SetColor { color: Expr::num("2") },
                Statement::Back { distance: Expr::num("7") },
                Statement::Rotate { angle: Expr::num("90") },
            ],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(
            listing(&program),
            vec![
                "penup",
                "movi %0,4",
                "movi %1,5",
                "mov tx,%0",
                "mov ty,%1",
                "movi %2,2",
                "mov tc,%2",
                "movi %3,7",
                "back %3",
                "movi %4,90",
                "add tr,tr,%4",
                "exit",
            ]
        );
    }

    #[test]
    fn test_redeclaration_rebinds_to_new_slot() {
        let prog = ast::Program {
            data: vec![var("x"), var("x")],
            main: vec![Statement::Increment { name: "x".to_string() }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(program.instructions[2].to_string(), "loadi %0,1");
    }

    #[test]
    fn test_undeclared_variable_is_an_error() {
        let prog = ast::Program {
            data: vec![var("x")],
            main: vec![Statement::Forward { distance: Expr::var("y") }],
        };
        assert_eq!(
            lower(&prog),
            Err(CompileError::UnknownSymbol {
                name: "y".to_string(),
                node: NodeKind::VariableExpr,
            })
        );
    }

    #[test]
    fn test_undeclared_array_in_assignment() {
        let prog = ast::Program {
            data: vec![],
            main: vec![Statement::AssignElement {
                name: "xs".to_string(),
                subscript: Expr::num("0"),
                value: Expr::num("1"),
            }],
        };
        assert_eq!(
            lower(&prog),
            Err(CompileError::UnknownSymbol {
                name: "xs".to_string(),
                node: NodeKind::AssignElement,
            })
        );
    }

    #[test]
    fn test_malformed_literals() {
        let prog = ast::Program {
            data: vec![],
            main: vec![Statement::Forward { distance: Expr::num("12abc") }],
        };
        assert_eq!(
            lower(&prog),
            Err(CompileError::MalformedLiteral {
                text: "12abc".to_string(),
                node: NodeKind::NumericExpr,
            })
        );

        let prog = ast::Program {
            data: vec![Declaration::Array {
                name: "xs".to_string(),
                size: Numeric::new("-2"),
            }],
            main: vec![],
        };
        assert_eq!(
            lower(&prog),
            Err(CompileError::MalformedLiteral {
                text: "-2".to_string(),
                node: NodeKind::ArrayDecl,
            })
        );
    }

    #[test]
    fn test_array_size_limits() {
        let array = |size: &str| ast::Program {
            data: vec![Declaration::Array {
                name: "xs".to_string(),
                size: Numeric::new(size),
            }],
            main: vec![],
        };

        for size in ["3000000000", "18446744073709551615", "65537"] {
            assert_eq!(
                lower(&array(size)),
                Err(CompileError::MalformedLiteral {
                    text: size.to_string(),
                    node: NodeKind::ArrayDecl,
                })
            );
        }

        assert_eq!(lower(&array("0")).unwrap().len(), 1);
        let largest = lower(&array(&MAX_ARRAY_SIZE.to_string())).unwrap();
        assert_eq!(largest.len(), MAX_ARRAY_SIZE + 1);
    }

    #[test]
    fn test_negative_literal() {
        let prog = ast::Program {
            data: vec![],
            main: vec![Statement::Rotate { angle: Expr::num("-45") }],
        };
        let program = lower(&prog).unwrap();
        assert_eq!(program.instructions[0].to_string(), "movi %0,-45");
    }
}
