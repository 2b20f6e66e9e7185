//! Replies sent privately to the broadcast author.

use super::dispatch::DispatchResult;
use super::schedule::TimeWindow;

/// Reply to an author who may not broadcast
pub const NOT_ADMIN: &str = "⛔ Commande réservée aux administrateurs.";

/// Reply when the cleaned content is too short
pub const TOO_SHORT: &str = "⚠️ Message trop court.";

/// Reply when the broadcast could not be started
pub const TECHNICAL_ERROR: &str = "❌ Erreur technique.";

/// Reply outside the allowed hours
#[must_use]
pub fn outside_hours(window: &TimeWindow) -> String {
    format!(
        "⏰ Envoi autorisé uniquement entre {:02}h et {:02}h.",
        window.start(),
        window.end()
    )
}

/// Acknowledgment sent before the first delivery
#[must_use]
pub fn in_progress(targets: usize) -> String {
    format!("⏳ Diffusion en cours ({targets} destinataires maximum)")
}

/// Final report
#[must_use]
pub fn summary(result: &DispatchResult) -> String {
    format!(
        "✅ *Diffusion terminée*\n\n📨 Succès : {}\n❌ Échecs : {}",
        result.sent, result.failed
    )
}
