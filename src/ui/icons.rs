//! Shared UI icons.
//!
//! Each icon has an ASCII fallback for terminals without emoji support.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static RETRY: Emoji<'_, '_> = Emoji("🔄 ", "[RETRY]");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[WAIT]");

// Stage indicators
pub static DETECTIVE: Emoji<'_, '_> = Emoji("🔍 ", "[GATHER]");
pub static CTO: Emoji<'_, '_> = Emoji("📊 ", "[ANALYZE]");
pub static GHOSTWRITER: Emoji<'_, '_> = Emoji("📝 ", "[WRITE]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
