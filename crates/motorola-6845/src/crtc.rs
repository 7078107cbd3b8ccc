//! The controller: register file, raster alarm and line renderer.

mod snapshot;

pub use snapshot::{SNAPSHOT_MAJOR, SNAPSHOT_MINOR, SNAPSHOT_MODULE};

use std::fmt;

use emu_core::{
    AlarmContext, AlarmHandle, InterruptKind, InterruptLines, InterruptSource, Observable, Value,
};

use crate::cache::LineCache;
use crate::config::{CrtcConfig, validate_columns};
use crate::cursor::{CursorBlink, CursorMode};
use crate::draw::{CELL_PIXELS, DrawMode, DrawTables, LineContext};
use crate::error::{ConfigError, PaletteError};
use crate::palette::{PALETTE_ENTRIES, Palette};
use crate::raster::RasterTiming;
use crate::registers::{
    CHARGEN_BYTES_PER_CHAR, Derived, Geometry, MAX_COLUMNS, NUM_REGISTERS, POWER_UP_REGISTERS,
    Polarity, R_HORIZONTAL_DISPLAYED, R_LIGHT_PEN_HI, R_LIGHT_PEN_LO, Wiring,
};

/// Diagnostic name of the per-line alarm.
pub const RASTER_ALARM_NAME: &str = "CrtcRasterDraw";
/// Name the controller registers its interrupt source under.
pub const INTERRUPT_SOURCE_NAME: &str = "CRTC";

/// Widest line that is still doubled horizontally in double-size mode.
const DOUBLE_WIDTH_MAX_COLUMNS: usize = 40;
/// Tallest display that is still doubled vertically in double-size mode.
const DOUBLE_HEIGHT_MAX_LINES: usize = 300;

/// Read-only view of the memory the controller fetches from.
///
/// Every access is reduced modulo the slice length, so addresses that wrap
/// past the end of screen memory or the character ROM stay in range.
#[derive(Debug, Clone, Copy)]
pub struct VideoMemory<'a> {
    screen: &'a [u8],
    chargen: &'a [u8],
}

impl<'a> VideoMemory<'a> {
    /// `chargen` holds 16 bytes per character.
    #[must_use]
    pub fn new(screen: &'a [u8], chargen: &'a [u8]) -> Self {
        Self { screen, chargen }
    }

    fn screen_byte(&self, address: usize) -> u8 {
        wrapped(self.screen, address)
    }

    fn chargen_byte(&self, index: usize) -> u8 {
        wrapped(self.chargen, index)
    }
}

fn wrapped(bytes: &[u8], index: usize) -> u8 {
    if bytes.is_empty() {
        0
    } else {
        bytes[index % bytes.len()]
    }
}

/// Disjoint borrows of the machine state the raster alarm needs.
pub struct CrtcParts<'a> {
    pub crtc: &'a mut Crtc,
    pub interrupts: &'a mut InterruptLines,
    pub video: VideoMemory<'a>,
}

/// Implemented by the machine that owns the controller and its alarm context.
///
/// The raster alarm handler receives the whole machine and uses this to get
/// at the controller, the interrupt lines and video memory at once.
pub trait CrtcHost {
    fn crtc_parts(&mut self) -> CrtcParts<'_>;
}

/// Display layout in effect for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    geometry: Geometry,
    line_columns: usize,
    scale_x: usize,
    scale_y: usize,
}

impl Layout {
    fn new(geometry: Geometry, line_columns: usize, double_size: bool) -> Self {
        let double_x = double_size && line_columns <= DOUBLE_WIDTH_MAX_COLUMNS;
        let double_y = double_size && geometry.visible_lines() <= DOUBLE_HEIGHT_MAX_LINES;
        Self {
            geometry,
            line_columns,
            scale_x: if double_x { 2 } else { 1 },
            scale_y: if double_y { 2 } else { 1 },
        }
    }

    fn width(&self) -> usize {
        self.line_columns * CELL_PIXELS * self.scale_x
    }

    fn height(&self) -> usize {
        self.geometry.visible_lines() * self.scale_y
    }
}

#[derive(Debug, PartialEq, Eq)]
struct CursorFootprint {
    shown: bool,
    lines: Vec<(usize, usize)>,
    address: usize,
    screen_base: u16,
}

type ResizeHandler = Box<dyn FnMut(u32, u32) + Send>;

/// Motorola 6845 CRT controller.
pub struct Crtc {
    regs: [u8; NUM_REGISTERS],
    /// Address register.
    selected: u8,
    /// Last non-zero R1. Writing 0 keeps the previous width.
    displayed: u8,
    wiring: Wiring,
    /// Decoded from `regs` after every write. Geometry in here is pending.
    derived: Derived,
    /// Applied geometry; only changes at frame start.
    layout: Layout,
    timing: RasterTiming,
    /// Cycle at which raster line 0 of the current frame began.
    origin: u64,
    cursor: CursorBlink,
    cache: LineCache,
    video_cache: bool,
    double_size: bool,
    double_scan: bool,
    draw_mode: DrawMode,
    tables: Box<DrawTables>,
    palette: Palette,
    /// ARGB32, `layout.width()` x `layout.height()`.
    framebuffer: Vec<u32>,
    screen_enabled: bool,
    /// Between frame start and the end of the displayed rows.
    in_display: bool,
    frame_interrupt: InterruptKind,
    interrupt: Option<InterruptSource>,
    raster_alarm: Option<AlarmHandle>,
    frames: u64,
    on_resize: Option<ResizeHandler>,
}

impl fmt::Debug for Crtc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crtc")
            .field("regs", &self.regs)
            .field("selected", &self.selected)
            .field("layout", &self.layout)
            .field("origin", &self.origin)
            .field("cursor", &self.cursor)
            .field("in_display", &self.in_display)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl Crtc {
    /// Build a controller with power-up register contents.
    ///
    /// The controller does nothing until [`install`](Self::install) hooks it
    /// into a clock domain.
    pub fn new(config: &CrtcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let wiring = config.wiring();
        let regs = POWER_UP_REGISTERS;
        let derived = Derived::from_registers(&regs, &wiring);
        let layout = Layout::new(derived.geometry, wiring.line_columns, config.double_size);
        let tables = DrawTables::new(&config.palette);
        let framebuffer = vec![tables.background(); layout.width() * layout.height()];

        Ok(Self {
            regs,
            selected: 0,
            displayed: regs[usize::from(R_HORIZONTAL_DISPLAYED)],
            wiring,
            derived,
            layout,
            timing: RasterTiming::new(
                derived.geometry.cycles_per_line,
                derived.geometry.lines_per_frame(),
            ),
            origin: 0,
            cursor: CursorBlink::new(),
            cache: LineCache::new(derived.geometry.visible_lines()),
            video_cache: config.video_cache,
            double_size: config.double_size,
            double_scan: config.double_scan,
            draw_mode: DrawMode::select(derived.polarity, layout.scale_x == 2),
            tables,
            palette: config.palette.clone(),
            framebuffer,
            screen_enabled: true,
            in_display: false,
            frame_interrupt: config.frame_interrupt,
            interrupt: None,
            raster_alarm: None,
            frames: 0,
            on_resize: None,
        })
    }

    /// Register the raster alarm and interrupt source, then start the
    /// raster at `now`.
    ///
    /// The frame-boundary line is first asserted when line 0 of the next
    /// frame is reached.
    pub fn install<T: CrtcHost>(
        &mut self,
        alarms: &mut AlarmContext<T>,
        interrupts: &mut InterruptLines,
        now: u64,
    ) {
        self.attach(alarms, interrupts);
        self.restart(alarms, interrupts, now);
    }

    /// Chip reset: the cursor blink state clears and the raster restarts at
    /// `now`. Register contents survive.
    pub fn reset<T: CrtcHost>(
        &mut self,
        alarms: &mut AlarmContext<T>,
        interrupts: &mut InterruptLines,
        now: u64,
    ) {
        self.cursor = CursorBlink::new();
        self.restart(alarms, interrupts, now);
    }

    fn attach<T: CrtcHost>(&mut self, alarms: &mut AlarmContext<T>, interrupts: &mut InterruptLines) {
        if self.raster_alarm.is_none() {
            self.raster_alarm = Some(alarms.new_alarm(RASTER_ALARM_NAME, raster_draw::<T>));
        }
        if self.interrupt.is_none() {
            self.interrupt = Some(interrupts.register_source(INTERRUPT_SOURCE_NAME));
        }
    }

    fn restart<T>(&mut self, alarms: &mut AlarmContext<T>, interrupts: &mut InterruptLines, now: u64) {
        self.apply_layout(true);
        self.origin = now;
        self.in_display = false;
        self.update_frame_line(interrupts);
        self.arm(alarms, now + u64::from(self.timing.cycles_per_line()));
    }

    fn arm<T>(&self, alarms: &mut AlarmContext<T>, target: u64) {
        if let Some(handle) = self.raster_alarm {
            alarms.set(handle, target);
        }
    }

    // ---------------------------------------------------------------------
    // Register interface
    // ---------------------------------------------------------------------

    /// Store `value` in register `index` and re-derive every dependent field.
    ///
    /// Writing the R8 display-disable pattern takes effect on the frame line
    /// immediately. Geometry changes wait for the next frame start.
    pub fn write(&mut self, interrupts: &mut InterruptLines, index: u8, value: u8) {
        let in_range = usize::from(index) < NUM_REGISTERS;
        debug_assert!(in_range, "CRTC register index {index} out of range");
        if !in_range {
            log::warn!("write of ${value:02X} to CRTC register {index} ignored: out of range");
            return;
        }

        self.regs[usize::from(index)] = value;
        if index == R_HORIZONTAL_DISPLAYED && value != 0 {
            self.displayed = value;
        }
        let was_disabled = self.derived.display_disabled;
        self.rederive();
        if self.derived.display_disabled != was_disabled {
            self.update_frame_line(interrupts);
        }
    }

    /// Last written value; the light pen registers read `$FF`.
    #[must_use]
    pub fn read(&self, index: u8) -> u8 {
        let in_range = usize::from(index) < NUM_REGISTERS;
        debug_assert!(in_range, "CRTC register index {index} out of range");
        if !in_range {
            log::warn!("read of CRTC register {index} ignored: out of range");
        }
        self.peek(index)
    }

    /// Same as [`read`](Self::read), for monitors. Out-of-range indices read 0.
    #[must_use]
    pub fn peek(&self, index: u8) -> u8 {
        match index {
            R_LIGHT_PEN_HI | R_LIGHT_PEN_LO => 0xFF,
            _ => self.regs.get(usize::from(index)).copied().unwrap_or(0),
        }
    }

    /// Address register write. Only the low five bits are latched.
    pub fn select(&mut self, value: u8) {
        self.selected = value & 0x1F;
    }

    #[must_use]
    pub fn selected_register(&self) -> u8 {
        self.selected
    }

    /// Data register write. Unimplemented registers ignore the write.
    pub fn write_selected(&mut self, interrupts: &mut InterruptLines, value: u8) {
        if usize::from(self.selected) < NUM_REGISTERS {
            self.write(interrupts, self.selected, value);
        }
    }

    /// Data register read. Unimplemented registers read 0.
    #[must_use]
    pub fn read_selected(&self) -> u8 {
        self.peek(self.selected)
    }

    fn rederive(&mut self) {
        let before = self.cursor_footprint();
        let previous = self.derived;
        self.derived = Derived::decode(&self.regs, &self.wiring, self.displayed);

        if self.derived.cursor_mode != previous.cursor_mode {
            self.cursor.restart();
        }
        if self.derived.polarity != previous.polarity {
            self.draw_mode = DrawMode::select(self.derived.polarity, self.layout.scale_x == 2);
        }

        let after = self.cursor_footprint();
        if before != after {
            for &(first, last) in before.lines.iter().chain(&after.lines) {
                self.cache.mark_dirty(first, last);
            }
        }
    }

    /// Everything that decides which pixels the cursor inverts.
    fn cursor_footprint(&self) -> CursorFootprint {
        CursorFootprint {
            shown: self.cursor_shown(),
            lines: self.cursor_lines(),
            address: self.cursor_address(),
            screen_base: self.derived.screen_base,
        }
    }

    // ---------------------------------------------------------------------
    // Raster
    // ---------------------------------------------------------------------

    /// Handle the line boundary reached at cycle `at`. Returns the cycle of
    /// the next boundary.
    fn line_boundary(
        &mut self,
        at: u64,
        interrupts: &mut InterruptLines,
        video: &VideoMemory<'_>,
    ) -> u64 {
        let line = self.timing.line(at.wrapping_sub(self.origin));
        let finished = line
            .checked_sub(1)
            .unwrap_or(self.timing.lines_per_frame() - 1);
        self.render_line(finished as usize, video);

        if line == 0 {
            self.frame_start(at, interrupts);
        } else if line as usize == self.layout.geometry.visible_lines() {
            self.in_display = false;
            self.update_frame_line(interrupts);
        }
        at + u64::from(self.timing.cycles_per_line())
    }

    fn frame_start(&mut self, at: u64, interrupts: &mut InterruptLines) {
        self.apply_layout(false);
        self.origin = at;
        self.frames += 1;

        if self.cursor.frame_start(self.derived.cursor_mode) {
            for (first, last) in self.cursor_lines() {
                self.cache.mark_dirty(first, last);
            }
        }

        self.in_display = self.layout.geometry.visible_lines() > 0;
        self.update_frame_line(interrupts);
    }

    /// Latch pending geometry. With `force` the frame buffer and line cache
    /// are rebuilt even when nothing changed.
    fn apply_layout(&mut self, force: bool) {
        let layout = Layout::new(self.derived.geometry, self.wiring.line_columns, self.double_size);
        self.latch_layout(layout, force);
    }

    fn latch_layout(&mut self, layout: Layout, force: bool) {
        if !force && layout == self.layout {
            return;
        }

        let previous_size = (self.layout.width(), self.layout.height());
        self.layout = layout;
        let geometry = layout.geometry;
        self.timing = RasterTiming::new(geometry.cycles_per_line, geometry.lines_per_frame());
        self.cache.reset(geometry.visible_lines());
        self.draw_mode = DrawMode::select(self.derived.polarity, layout.scale_x == 2);
        self.framebuffer.clear();
        self.framebuffer
            .resize(layout.width() * layout.height(), self.tables.background());

        log::debug!(
            "CRTC timing latched: {} cycles/line, {} lines/frame, {}x{} characters of {} lines",
            geometry.cycles_per_line,
            geometry.lines_per_frame(),
            geometry.columns,
            geometry.rows,
            geometry.char_height
        );

        let size = (layout.width(), layout.height());
        if size != previous_size {
            if let Some(handler) = self.on_resize.as_mut() {
                handler(size.0 as u32, size.1 as u32);
            }
        }
    }

    fn update_frame_line(&self, interrupts: &mut InterruptLines) {
        if let Some(source) = self.interrupt {
            let level = self.in_display && !self.derived.display_disabled;
            interrupts.set(self.frame_interrupt, source, level);
        }
    }

    // ---------------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------------

    fn render_line(&mut self, line: usize, video: &VideoMemory<'_>) {
        let layout = self.layout;
        let geometry = layout.geometry;
        if line >= geometry.visible_lines() {
            return;
        }

        let width = layout.width();
        let start = line * layout.scale_y * width;
        let background = self.tables.background();

        if !self.screen_enabled || self.derived.display_disabled {
            self.framebuffer[start..start + width * layout.scale_y].fill(background);
            self.cache.mark_dirty(line, line);
            return;
        }

        let char_height = usize::from(geometry.char_height);
        let (row, y) = (line / char_height, line % char_height);
        let visible = geometry.columns;
        let mut cells = [0u8; MAX_COLUMNS];
        for (column, cell) in cells[..visible].iter_mut().enumerate() {
            let code = usize::from(video.screen_byte(self.cell_address(row, column)));
            *cell = video.chargen_byte(
                self.derived.char_generator_offset + code * CHARGEN_BYTES_PER_CHAR + y,
            );
        }
        let context = LineContext {
            visible,
            width: layout.line_columns,
            cursor_column: self.cursor_column(row, y),
        };

        let polarity = self.derived.polarity;
        let mode = self.draw_mode;
        let tables = &self.tables;
        let pixels = &mut self.framebuffer[start..start + width];
        let Some(entry) = self.cache.entry_mut(line) else {
            return;
        };

        if !self.video_cache {
            mode.draw_line(tables, pixels, &context, &cells[..visible]);
            entry.mark_dirty();
        } else if entry.is_dirty() {
            entry.refill(&cells[..visible], layout.line_columns, polarity);
            mode.draw_line(tables, pixels, &context, &cells[..visible]);
            entry.mark_clean();
        } else if entry.fill_cache(&cells[..visible], layout.line_columns, polarity) {
            if let Some(span) = entry.dirty_span() {
                mode.draw_line_cached(tables, pixels, &context, entry, span);
            }
        }

        if layout.scale_y == 2 {
            let odd = start + width;
            if self.double_scan {
                self.framebuffer.copy_within(start..odd, odd);
            } else {
                self.framebuffer[odd..odd + width].fill(background);
            }
        }
    }

    /// Screen character index of a displayed cell, wrapped to the address mask.
    fn cell_address(&self, row: usize, column: usize) -> usize {
        let base = usize::from(self.derived.screen_base) * self.wiring.columns_per_address();
        (base + row * self.layout.geometry.address_stride + column) & self.wiring.effective_mask()
    }

    fn cursor_address(&self) -> usize {
        (usize::from(self.derived.cursor_position) * self.wiring.columns_per_address())
            & self.wiring.effective_mask()
    }

    fn cursor_shown(&self) -> bool {
        self.cursor.visible(self.derived.cursor_mode)
    }

    /// Cell showing the cursor on scanline `y` of character row `row`.
    fn cursor_column(&self, row: usize, y: usize) -> Option<usize> {
        let (start, end) = (
            usize::from(self.derived.cursor_start),
            usize::from(self.derived.cursor_end),
        );
        if !self.cursor_shown() || y < start || y > end {
            return None;
        }
        let target = self.cursor_address();
        (0..self.layout.geometry.columns).find(|&column| self.cell_address(row, column) == target)
    }

    /// Scanline ranges covered by the cursor, whatever its blink phase.
    fn cursor_lines(&self) -> Vec<(usize, usize)> {
        let geometry = self.layout.geometry;
        let char_height = usize::from(geometry.char_height);
        let start = usize::from(self.derived.cursor_start);
        let end = usize::from(self.derived.cursor_end).min(char_height.saturating_sub(1));
        if start > end {
            return Vec::new();
        }
        let target = self.cursor_address();
        (0..usize::from(geometry.rows))
            .filter(|&row| {
                (0..geometry.columns).any(|column| self.cell_address(row, column) == target)
            })
            .map(|row| (row * char_height + start, row * char_height + end))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Machine options
    // ---------------------------------------------------------------------

    /// Takes effect at the next frame start.
    pub fn set_double_size(&mut self, enabled: bool) {
        self.double_size = enabled;
    }

    pub fn set_double_scan(&mut self, enabled: bool) {
        self.double_scan = enabled;
        self.cache.invalidate_all();
    }

    pub fn set_video_cache(&mut self, enabled: bool) {
        self.video_cache = enabled;
        self.cache.invalidate_all();
    }

    /// Replace the palette and repaint everything.
    pub fn set_palette(&mut self, palette: Palette) -> Result<(), ConfigError> {
        if !palette.is_complete() {
            return Err(ConfigError::Palette(PaletteError::TooFewEntries {
                found: palette.entries().len(),
                required: PALETTE_ENTRIES,
            }));
        }
        self.tables = DrawTables::new(&palette);
        self.palette = palette;
        self.cache.invalidate_all();
        Ok(())
    }

    /// Board-level screen options, as switched by the machine model.
    ///
    /// The new line width takes effect at the next frame start.
    pub fn set_screen_mode(
        &mut self,
        address_mask: u16,
        columns: usize,
        hardware_cursor: bool,
        double_columns: bool,
    ) -> Result<(), ConfigError> {
        validate_columns(columns)?;
        self.wiring.address_mask = address_mask;
        self.wiring.line_columns = columns;
        self.wiring.hardware_cursor = hardware_cursor;
        self.wiring.double_columns = double_columns;
        self.rederive();
        Ok(())
    }

    /// Select the character generator bank, in characters.
    pub fn set_chargen_offset(&mut self, characters: u16) {
        self.wiring.chargen_bank = characters;
        self.rederive();
    }

    /// External blanking input. Blanked lines show the background colour.
    pub fn screen_enable(&mut self, enabled: bool) {
        self.screen_enabled = enabled;
    }

    /// Redraw every line on the next frame.
    pub fn force_repaint(&mut self) {
        self.cache.invalidate_all();
    }

    /// Called with the new frame buffer width and height after a geometry
    /// change resized it.
    pub fn set_resize_handler(&mut self, handler: impl FnMut(u32, u32) + Send + 'static) {
        self.on_resize = Some(Box::new(handler));
    }

    // ---------------------------------------------------------------------
    // State access
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> u32 {
        self.layout.width() as u32
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> u32 {
        self.layout.height() as u32
    }

    #[must_use]
    pub fn registers(&self) -> &[u8; NUM_REGISTERS] {
        &self.regs
    }

    #[must_use]
    pub fn screen_base(&self) -> u16 {
        self.derived.screen_base
    }

    #[must_use]
    pub fn char_generator_offset(&self) -> usize {
        self.derived.char_generator_offset
    }

    #[must_use]
    pub fn address_mask(&self) -> u16 {
        self.derived.address_mask
    }

    #[must_use]
    pub fn cursor_position(&self) -> u16 {
        self.derived.cursor_position
    }

    #[must_use]
    pub fn cursor_mode(&self) -> CursorMode {
        self.derived.cursor_mode
    }

    #[must_use]
    pub fn cursor_start_line(&self) -> u8 {
        self.derived.cursor_start
    }

    #[must_use]
    pub fn cursor_end_line(&self) -> u8 {
        self.derived.cursor_end
    }

    /// Blink phase: true while a blinking cursor is shown.
    #[must_use]
    pub fn cursor_state(&self) -> bool {
        self.cursor.state()
    }

    #[must_use]
    pub fn cursor_blink_counter(&self) -> u8 {
        self.cursor.counter()
    }

    /// Geometry in effect for the current frame.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.layout.geometry
    }

    /// Geometry that the next frame start will apply.
    #[must_use]
    pub fn pending_geometry(&self) -> Geometry {
        self.derived.geometry
    }

    #[must_use]
    pub fn polarity(&self) -> Polarity {
        self.derived.polarity
    }

    #[must_use]
    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Scanline the beam is on at `clock`.
    #[must_use]
    pub fn raster_line(&self, clock: u64) -> u32 {
        self.timing.line(clock.wrapping_sub(self.origin))
    }

    /// Cycle within the scanline at `clock`.
    #[must_use]
    pub fn raster_cycle(&self, clock: u64) -> u32 {
        self.timing.cycle(clock.wrapping_sub(self.origin))
    }

    #[must_use]
    pub fn cycles_per_frame(&self) -> u64 {
        self.timing.cycles_per_frame()
    }

    /// True while the beam is outside the displayed rows.
    #[must_use]
    pub fn off_screen(&self) -> bool {
        !self.in_display
    }

    #[must_use]
    pub fn screen_enabled(&self) -> bool {
        self.screen_enabled
    }

    /// Frame starts since creation.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Whether `line` will be fully redrawn. Lines outside the display count
    /// as dirty.
    #[must_use]
    pub fn line_is_dirty(&self, line: usize) -> bool {
        self.cache.is_dirty(line)
    }

    #[must_use]
    pub fn interrupt_source(&self) -> Option<InterruptSource> {
        self.interrupt
    }
}

fn raster_draw<T: CrtcHost>(host: &mut T, alarms: &mut AlarmContext<T>, overrun: u64) {
    let fired_at = alarms.now() - overrun;
    let CrtcParts {
        crtc,
        interrupts,
        video,
    } = host.crtc_parts();
    let next = crtc.line_boundary(fired_at, interrupts, &video);
    crtc.arm(alarms, next);
}

fn cursor_mode_name(mode: CursorMode) -> &'static str {
    match mode {
        CursorMode::Off => "off",
        CursorMode::Solid => "solid",
        CursorMode::BlinkSlow => "blink-slow",
        CursorMode::BlinkFast => "blink-fast",
    }
}

const QUERY_PATHS: &[&str] = &[
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
    "r15", "r16", "r17", "r18", "r19",
    "regs",
    "selected",
    "screen_base",
    "chargen_offset",
    "address_mask",
    "cursor.position",
    "cursor.mode",
    "cursor.state",
    "cursor.counter",
    "cursor.start",
    "cursor.end",
    "columns",
    "rows",
    "char_height",
    "cycles_per_line",
    "lines_per_frame",
    "visible_lines",
    "reverse",
    "in_display",
    "screen_enabled",
    "frames",
];

impl Observable for Crtc {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(index) = path.strip_prefix('r').and_then(|n| n.parse::<u8>().ok()) {
            return (usize::from(index) < NUM_REGISTERS).then(|| self.peek(index).into());
        }
        let geometry = self.layout.geometry;
        match path {
            "regs" => Some(self.regs.as_slice().into()),
            "selected" => Some(self.selected.into()),
            "screen_base" => Some(self.derived.screen_base.into()),
            "chargen_offset" => Some((self.derived.char_generator_offset as u32).into()),
            "address_mask" => Some(self.derived.address_mask.into()),
            "cursor.position" => Some(self.derived.cursor_position.into()),
            "cursor.mode" => Some(cursor_mode_name(self.derived.cursor_mode).into()),
            "cursor.state" => Some(self.cursor.state().into()),
            "cursor.counter" => Some(self.cursor.counter().into()),
            "cursor.start" => Some(self.derived.cursor_start.into()),
            "cursor.end" => Some(self.derived.cursor_end.into()),
            "columns" => Some((geometry.columns as u32).into()),
            "rows" => Some(geometry.rows.into()),
            "char_height" => Some(geometry.char_height.into()),
            "cycles_per_line" => Some(geometry.cycles_per_line.into()),
            "lines_per_frame" => Some(geometry.lines_per_frame().into()),
            "visible_lines" => Some((geometry.visible_lines() as u32).into()),
            "reverse" => Some((self.derived.polarity == Polarity::Reverse).into()),
            "in_display" => Some(self.in_display.into()),
            "screen_enabled" => Some(self.screen_enabled.into()),
            "frames" => Some(self.frames.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{
        R_CURSOR_END, R_CURSOR_HI, R_CURSOR_LO, R_CURSOR_START, R_HORIZONTAL_DISPLAYED,
        R_HORIZONTAL_TOTAL, R_MAX_SCANLINE, R_MODE_CONTROL, R_START_ADDRESS_HI,
        R_START_ADDRESS_LO, R_VERTICAL_DISPLAYED, R_VERTICAL_TOTAL,
    };
    use emu_core::ClockDomain;

    const FG: u32 = 0xFFFF_FFFF;
    const BG: u32 = 0xFF00_0000;

    /// Small machine: 8 columns x 2 rows of 2-line characters, 10 cycles
    /// per line, 6 lines per frame.
    struct Board {
        crtc: Crtc,
        interrupts: InterruptLines,
        screen: Vec<u8>,
        chargen: Vec<u8>,
    }

    impl CrtcHost for Board {
        fn crtc_parts(&mut self) -> CrtcParts<'_> {
            CrtcParts {
                crtc: &mut self.crtc,
                interrupts: &mut self.interrupts,
                video: VideoMemory::new(&self.screen, &self.chargen),
            }
        }
    }

    fn config() -> CrtcConfig {
        CrtcConfig {
            columns: 8,
            reverse_switch: None,
            palette: Palette::new(BG, FG),
            ..CrtcConfig::default()
        }
    }

    /// Character 1 is solid on its first scanline; everything else is blank.
    fn board_with(config: &CrtcConfig) -> (Board, ClockDomain<Board>) {
        let mut chargen = vec![0u8; 512 * CHARGEN_BYTES_PER_CHAR];
        chargen[CHARGEN_BYTES_PER_CHAR] = 0xFF;
        let mut board = Board {
            crtc: Crtc::new(config).expect("valid config"),
            interrupts: InterruptLines::new(),
            screen: vec![0u8; 1024],
            chargen,
        };
        for (index, value) in [
            (R_HORIZONTAL_TOTAL, 9),
            (R_HORIZONTAL_DISPLAYED, 8),
            (R_VERTICAL_TOTAL, 2),
            (R_VERTICAL_DISPLAYED, 2),
            (R_MAX_SCANLINE, 1),
        ] {
            board.crtc.write(&mut board.interrupts, index, value);
        }
        let mut domain = ClockDomain::new("cpu");
        let Board {
            crtc, interrupts, ..
        } = &mut board;
        crtc.install(domain.alarms_mut(), interrupts, 0);
        (board, domain)
    }

    fn board() -> (Board, ClockDomain<Board>) {
        board_with(&config())
    }

    fn run_frames(board: &mut Board, domain: &mut ClockDomain<Board>, frames: u64) {
        let cycles = board.crtc.cycles_per_frame() * frames;
        domain.on_cycles_elapsed(board, cycles);
    }

    fn pixel(board: &Board, x: usize, y: usize) -> u32 {
        board.crtc.framebuffer()[y * board.crtc.framebuffer_width() as usize + x]
    }

    #[test]
    fn rejects_bad_config() {
        let bad = CrtcConfig {
            columns: 0,
            ..CrtcConfig::default()
        };
        assert!(matches!(
            Crtc::new(&bad).expect_err("zero columns"),
            ConfigError::Columns { requested: 0, .. }
        ));
    }

    #[test]
    fn install_latches_written_geometry() {
        let (board, _) = board();
        let geometry = board.crtc.geometry();
        assert_eq!(geometry.cycles_per_line, 10);
        assert_eq!(geometry.lines_per_frame(), 6);
        assert_eq!(geometry.visible_lines(), 4);
        assert_eq!(board.crtc.framebuffer_width(), 64);
        assert_eq!(board.crtc.framebuffer_height(), 4);
    }

    #[test]
    fn geometry_waits_for_frame_start() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_HORIZONTAL_TOTAL, 19);
        assert_eq!(board.crtc.geometry().cycles_per_line, 10);
        assert_eq!(board.crtc.pending_geometry().cycles_per_line, 20);

        domain.on_cycles_elapsed(&mut board, 59);
        assert_eq!(board.crtc.geometry().cycles_per_line, 10);
        domain.on_cycles_elapsed(&mut board, 1);
        assert_eq!(board.crtc.geometry().cycles_per_line, 20);
        assert_eq!(board.crtc.raster_line(domain.now()), 0);
        assert_eq!(board.crtc.raster_line(domain.now() + 20), 1);
    }

    #[test]
    fn frame_line_follows_display_rows() {
        let (mut board, mut domain) = board();
        let source = board.crtc.interrupt_source().expect("installed");
        assert!(!board.interrupts.sampled(InterruptKind::Irq));

        run_frames(&mut board, &mut domain, 1);
        assert!(board.interrupts.sampled(InterruptKind::Irq));
        assert!(!board.crtc.off_screen());

        // Four displayed lines of ten cycles.
        domain.on_cycles_elapsed(&mut board, 40);
        assert!(!board.interrupts.sampled(InterruptKind::Irq));
        assert!(board.crtc.off_screen());
        assert_eq!(board.interrupts.raised_count(InterruptKind::Irq, source), 1);
    }

    #[test]
    fn r8_disable_releases_frame_line_immediately() {
        let (mut board, mut domain) = board();
        run_frames(&mut board, &mut domain, 1);
        assert!(board.interrupts.sampled(InterruptKind::Irq));

        board.crtc.write(&mut board.interrupts, R_MODE_CONTROL, 0x30);
        assert!(!board.interrupts.sampled(InterruptKind::Irq));
        board.crtc.write(&mut board.interrupts, R_MODE_CONTROL, 0x00);
        assert!(board.interrupts.sampled(InterruptKind::Irq));
    }

    #[test]
    fn renders_characters_and_idle_columns() {
        let (mut board, mut domain) = board();
        board.screen[0] = 1;
        board.crtc.write(&mut board.interrupts, R_HORIZONTAL_DISPLAYED, 4);
        run_frames(&mut board, &mut domain, 2);

        assert_eq!(board.crtc.geometry().columns, 4);
        assert_eq!(pixel(&board, 0, 0), FG);
        assert_eq!(pixel(&board, 7, 0), FG);
        assert_eq!(pixel(&board, 8, 0), BG);
        assert_eq!(pixel(&board, 0, 1), BG, "second scanline of character 1");
        assert!((32..64).all(|x| pixel(&board, x, 0) == BG), "idle columns");
    }

    #[test]
    fn rows_advance_by_r1_in_memory() {
        let (mut board, mut domain) = board();
        board.screen[8] = 1;
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), BG);
        assert_eq!(pixel(&board, 0, 2), FG, "row 1 starts at address 8");
    }

    #[test]
    fn screen_base_wraps_at_address_mask() {
        let (mut board, mut domain) = board();
        board.screen[0] = 1;
        // Base $03FC: columns 4-7 of row 0 wrap to addresses 0-3.
        board.crtc.write(&mut board.interrupts, R_START_ADDRESS_HI, 0x03);
        board.crtc.write(&mut board.interrupts, R_START_ADDRESS_LO, 0xFC);
        assert_eq!(board.crtc.screen_base(), 0x03FC);
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 4 * 8, 0), FG);
        assert_eq!(pixel(&board, 0, 0), BG);
    }

    #[test]
    fn second_render_of_same_content_is_clean_and_identical() {
        let (mut board, mut domain) = board();
        board.screen[3] = 1;
        run_frames(&mut board, &mut domain, 1);
        let first = board.crtc.framebuffer().to_vec();
        assert!((0..4).all(|line| !board.crtc.line_is_dirty(line)));

        run_frames(&mut board, &mut domain, 1);
        assert_eq!(board.crtc.framebuffer(), first.as_slice());
        assert!((0..4).all(|line| !board.crtc.line_is_dirty(line)));
    }

    #[test]
    fn memory_change_repaints_only_that_cell() {
        let (mut board, mut domain) = board();
        run_frames(&mut board, &mut domain, 1);
        board.screen[5] = 1;
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 5 * 8, 0), FG);
        assert_eq!(pixel(&board, 4 * 8, 0), BG);
    }

    #[test]
    fn uncached_rendering_matches_cached() {
        let (mut cached, mut cached_domain) = board();
        let (mut plain, mut plain_domain) = board_with(&CrtcConfig {
            video_cache: false,
            ..config()
        });
        for board in [&mut cached, &mut plain] {
            board.screen[2] = 1;
            board.screen[9] = 1;
        }
        run_frames(&mut cached, &mut cached_domain, 2);
        run_frames(&mut plain, &mut plain_domain, 2);
        assert_eq!(cached.crtc.framebuffer(), plain.crtc.framebuffer());
        assert!(plain.crtc.line_is_dirty(0), "cache disabled");
    }

    #[test]
    fn solid_cursor_inverts_its_cell() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_CURSOR_START, 0x00);
        board.crtc.write(&mut board.interrupts, R_CURSOR_END, 0x01);
        board.crtc.write(&mut board.interrupts, R_CURSOR_HI, 0x00);
        board.crtc.write(&mut board.interrupts, R_CURSOR_LO, 10);
        run_frames(&mut board, &mut domain, 1);

        // Address 10 is row 1, column 2.
        assert_eq!(pixel(&board, 2 * 8, 2), FG);
        assert_eq!(pixel(&board, 2 * 8, 3), FG);
        assert_eq!(pixel(&board, 3 * 8, 2), BG);
        assert_eq!(pixel(&board, 2 * 8, 0), BG);
    }

    #[test]
    fn moving_cursor_dirties_old_and_new_rows() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_CURSOR_START, 0x00);
        board.crtc.write(&mut board.interrupts, R_CURSOR_END, 0x00);
        run_frames(&mut board, &mut domain, 1);
        assert!((0..4).all(|line| !board.crtc.line_is_dirty(line)));

        board.crtc.write(&mut board.interrupts, R_CURSOR_LO, 9);
        assert!(board.crtc.line_is_dirty(0), "old cursor row");
        assert!(board.crtc.line_is_dirty(2), "new cursor row");
        assert!(!board.crtc.line_is_dirty(1));
        assert!(!board.crtc.line_is_dirty(3));

        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), BG, "no ghost at the old position");
        assert_eq!(pixel(&board, 8, 2), FG);
    }

    #[test]
    fn cursor_move_along_its_row_repaints_both_cells() {
        let (mut cached, mut cached_domain) = board();
        let (mut uncached, mut uncached_domain) = board();
        uncached.crtc.set_video_cache(false);
        for board in [&mut cached, &mut uncached] {
            board.crtc.write(&mut board.interrupts, R_CURSOR_START, 0x00);
            board.crtc.write(&mut board.interrupts, R_CURSOR_END, 0x00);
            board.crtc.write(&mut board.interrupts, R_CURSOR_LO, 1);
        }
        run_frames(&mut cached, &mut cached_domain, 2);
        run_frames(&mut uncached, &mut uncached_domain, 2);
        assert_eq!(pixel(&cached, 8, 0), FG);

        cached.crtc.write(&mut cached.interrupts, R_CURSOR_LO, 2);
        uncached.crtc.write(&mut uncached.interrupts, R_CURSOR_LO, 2);
        assert!(cached.crtc.line_is_dirty(0), "same row, new column");

        run_frames(&mut cached, &mut cached_domain, 1);
        run_frames(&mut uncached, &mut uncached_domain, 1);
        assert_eq!(pixel(&cached, 8, 0), BG, "old cell restored");
        assert_eq!(pixel(&cached, 16, 0), FG, "new cell inverted");
        assert_eq!(cached.crtc.framebuffer(), uncached.crtc.framebuffer());
    }

    #[test]
    fn scrolling_under_the_cursor_moves_it() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_CURSOR_START, 0x00);
        board.crtc.write(&mut board.interrupts, R_CURSOR_END, 0x00);
        board.crtc.write(&mut board.interrupts, R_CURSOR_LO, 2);
        run_frames(&mut board, &mut domain, 2);
        assert_eq!(pixel(&board, 16, 0), FG);

        // Blank screen: only the cursor tells the two frames apart.
        board.crtc.write(&mut board.interrupts, R_START_ADDRESS_LO, 1);
        assert!(board.crtc.line_is_dirty(0));
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 8, 0), FG);
        assert_eq!(pixel(&board, 16, 0), BG);
    }

    #[test]
    fn zero_displayed_characters_keeps_previous_width() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_HORIZONTAL_DISPLAYED, 0);
        assert_eq!(board.crtc.read(R_HORIZONTAL_DISPLAYED), 0, "raw byte reads back");
        assert_eq!(board.crtc.pending_geometry().columns, 8);

        board.screen[7] = 1;
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(board.crtc.geometry().columns, 8);
        assert_eq!(pixel(&board, 7 * 8, 0), FG);

        board.crtc.write(&mut board.interrupts, R_HORIZONTAL_DISPLAYED, 4);
        assert_eq!(board.crtc.pending_geometry().columns, 4);
    }

    #[test]
    fn blink_phase_moves_only_at_frame_start() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_CURSOR_START, 0x60);
        assert_eq!(board.crtc.cursor_blink_counter(), 16);

        domain.on_cycles_elapsed(&mut board, 59);
        assert_eq!(board.crtc.cursor_blink_counter(), 16);
        domain.on_cycles_elapsed(&mut board, 1);
        assert_eq!(board.crtc.cursor_blink_counter(), 15);
    }

    #[test]
    fn blanked_lines_show_background_and_stay_dirty() {
        let (mut board, mut domain) = board();
        board.screen[0] = 1;
        board.crtc.screen_enable(false);
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), BG);
        assert!(board.crtc.line_is_dirty(0));

        board.crtc.screen_enable(true);
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), FG);
    }

    #[test]
    fn reverse_video_from_r12() {
        let (mut board, mut domain) = board_with(&CrtcConfig {
            reverse_switch: Some(0x1000),
            ..config()
        });
        assert_eq!(board.crtc.polarity(), Polarity::Reverse);
        assert_eq!(board.crtc.draw_mode(), DrawMode::Reverse1x);
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), FG, "blank cell inverted");

        board.crtc.write(&mut board.interrupts, R_START_ADDRESS_HI, 0x10);
        assert_eq!(board.crtc.draw_mode(), DrawMode::Standard1x);
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), BG);
    }

    #[test]
    fn double_size_resizes_at_frame_start() {
        let (mut board, mut domain) = board();
        let sizes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = std::sync::Arc::clone(&sizes);
        board.crtc.set_resize_handler(move |w, h| {
            if let Ok(mut sizes) = seen.lock() {
                sizes.push((w, h));
            }
        });
        board.screen[0] = 1;
        board.crtc.set_double_size(true);
        run_frames(&mut board, &mut domain, 2);

        assert_eq!(board.crtc.framebuffer_width(), 128);
        assert_eq!(board.crtc.framebuffer_height(), 8);
        assert_eq!(board.crtc.draw_mode(), DrawMode::Standard2x);
        assert_eq!(pixel(&board, 15, 0), FG);
        assert_eq!(pixel(&board, 15, 1), FG, "double scan copies the line");
        assert_eq!(sizes.lock().map(|s| s.clone()).unwrap_or_default(), vec![(128, 8)]);
    }

    #[test]
    fn without_double_scan_odd_rows_are_background() {
        let (mut board, mut domain) = board_with(&CrtcConfig {
            double_size: true,
            double_scan: false,
            ..config()
        });
        board.screen[0] = 1;
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), FG);
        assert_eq!(pixel(&board, 0, 1), BG);
    }

    #[test]
    fn palette_change_repaints() {
        let (mut board, mut domain) = board();
        run_frames(&mut board, &mut domain, 1);
        board
            .crtc
            .set_palette(Palette::new(0xFF00_00FF, FG))
            .expect("complete palette");
        assert!(board.crtc.line_is_dirty(0));
        run_frames(&mut board, &mut domain, 1);
        assert_eq!(pixel(&board, 0, 0), 0xFF00_00FF);
    }

    #[test]
    fn light_pen_registers_read_ff() {
        let (mut board, _) = board();
        board.crtc.write(&mut board.interrupts, R_LIGHT_PEN_HI, 0x12);
        board.crtc.write(&mut board.interrupts, R_CURSOR_LO, 0x34);
        assert_eq!(board.crtc.read(R_LIGHT_PEN_HI), 0xFF);
        assert_eq!(board.crtc.read(R_LIGHT_PEN_LO), 0xFF);
        assert_eq!(board.crtc.read(R_CURSOR_LO), 0x34);
        assert_eq!(board.crtc.read(R_VERTICAL_DISPLAYED), 2, "write-only reads back");
        assert_eq!(board.crtc.registers()[usize::from(R_LIGHT_PEN_HI)], 0x12);
    }

    #[test]
    fn selected_register_ignores_unimplemented_indices() {
        let (mut board, _) = board();
        board.crtc.select(0xFF);
        assert_eq!(board.crtc.selected_register(), 0x1F);
        board.crtc.write_selected(&mut board.interrupts, 0x55);
        assert_eq!(board.crtc.read_selected(), 0);

        board.crtc.select(R_CURSOR_LO);
        board.crtc.write_selected(&mut board.interrupts, 0x77);
        assert_eq!(board.crtc.read_selected(), 0x77);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn direct_write_past_register_file_is_a_precondition_violation() {
        let (mut board, _) = board();
        board.crtc.write(&mut board.interrupts, 20, 0);
    }

    #[test]
    fn reset_restarts_raster_and_clears_blink() {
        let (mut board, mut domain) = board();
        board.crtc.write(&mut board.interrupts, R_CURSOR_START, 0x40);
        domain.on_cycles_elapsed(&mut board, 75);
        let now = domain.now();
        let Board {
            crtc, interrupts, ..
        } = &mut board;
        crtc.reset(domain.alarms_mut(), interrupts, now);
        assert_eq!(crtc.raster_line(now), 0);
        assert_eq!(crtc.raster_cycle(now + 3), 3);
        assert_eq!(crtc.cursor_blink_counter(), 0);
        assert_eq!(crtc.registers()[usize::from(R_CURSOR_START)], 0x40);
    }

    #[test]
    fn observable_paths() {
        let (mut board, _) = board();
        board.crtc.write(&mut board.interrupts, R_START_ADDRESS_LO, 0x28);
        assert_eq!(board.crtc.query("r13"), Some(Value::U8(0x28)));
        assert_eq!(board.crtc.query("screen_base"), Some(Value::U16(0x28)));
        assert_eq!(board.crtc.query("cursor.mode"), Some(Value::String("off".into())));
        assert_eq!(board.crtc.query("columns"), Some(Value::U32(8)));
        assert_eq!(board.crtc.query("r20"), None);
        assert_eq!(board.crtc.query("bogus"), None);
        for path in board.crtc.query_paths() {
            assert!(board.crtc.query(path).is_some(), "{path}");
        }
    }
}
