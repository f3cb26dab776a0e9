//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::cpu::{Register, MEMORY_SIZE};
use crate::asm::csv::CELLS_PER_ROW;
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(60),
        ])
        .split(frame.area());

    // Left side: code and registers
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);

    // Right side: memory, status and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((MEMORY_SIZE / CELLS_PER_ROW) as u16 + 3),
            Constraint::Length(4),
            Constraint::Min(5),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_status(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly view around the PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}{:02X}: {}", prefix, addr, instr)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

fn register_span(reg: &Register) -> Vec<Span<'static>> {
    vec![
        Span::raw(format!("{:>3}: ", reg.label())),
        Span::styled(reg.hex(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
    ]
}

/// Draw register and flag state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = app.cpu.regs();
    let flags = app.cpu.flags();
    let flag_style = |set: bool| {
        if set {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        }
    };

    let mut top = register_span(&regs.pc);
    top.extend(register_span(&regs.acc));
    let mut middle = register_span(&regs.ir);
    middle.extend(register_span(&regs.q));

    let mode = app.cpu.run_mode();
    let content = vec![
        Line::from(top),
        Line::from(middle),
        Line::from(vec![
            Span::raw("Flags: "),
            Span::styled("C ", flag_style(flags.carry)),
            Span::styled("Z ", flag_style(flags.zero)),
            Span::styled("N", flag_style(flags.negative)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles()), Style::default().fg(Color::Cyan)),
            Span::raw("   Mode: "),
            Span::styled(format!("{:?}", mode),
                if mode.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw the memory grid, one row of cells per line.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let pc = app.cpu.regs().pc_address();

    let mut lines = vec![Line::from(
        std::iter::once(Span::raw("    "))
            .chain((0..CELLS_PER_ROW).map(|col| {
                Span::styled(format!("_{:X} ", col), Style::default().fg(Color::DarkGray))
            }))
            .collect::<Vec<_>>(),
    )];

    for row in 0..MEMORY_SIZE / CELLS_PER_ROW {
        let mut spans = vec![Span::styled(
            format!("{:X}_  ", row),
            Style::default().fg(Color::DarkGray),
        )];
        for col in 0..CELLS_PER_ROW {
            let addr = row * CELLS_PER_ROW + col;
            let value = app.cpu.mem().read(addr);

            let (text, style) = if addr == app.selected {
                let text = if app.edit.is_empty() {
                    format!("{:02X}", value)
                } else {
                    format!("{:_<2}", app.edit)
                };
                (text, Style::default().fg(Color::Black).bg(Color::Cyan))
            } else if Some(addr) == pc {
                (format!("{:02X}", value), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            } else if value != 0 {
                (format!("{:02X}", value), Style::default().fg(Color::White))
            } else {
                (format!("{:02X}", value), Style::default().fg(Color::DarkGray))
            };
            spans.push(Span::styled(text, style));
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }

    let title = format!(" Memory [0x{:02X}] ", app.selected);
    let paragraph = Paragraph::new(lines)
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(paragraph, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu_style = if app.cpu.last_message_is_error() {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };

    let mut lines = vec![Line::styled(app.cpu.last_message().to_string(), cpu_style)];
    if let Some(notice) = &app.notice {
        lines.push(Line::styled(notice.clone(), Style::default().fg(Color::Yellow)));
    }

    let status = Paragraph::new(lines)
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  g: Run fast  p: Stop  x: Reset"),
        Line::from("←→↑↓: Select cell  0-9 a-f: Type  Enter: Store  Esc: Cancel"),
        Line::from("u: Delete cell  n: Insert cell  w: Save  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
