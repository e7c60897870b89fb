//! crates/folklore_core/src/messages.rs
//!
//! User-facing strings. The product ships in Spanish only.

// --- Auth ---
pub const PASSWORDS_DO_NOT_MATCH: &str = "Las contraseñas no coinciden";
pub const REGISTRATION_FAILED: &str = "Registro fallido";
pub const SOMETHING_WENT_WRONG: &str = "Algo salió mal";
pub const ALREADY_REGISTERED: &str = "Usuario ya registrado";
pub const ALREADY_REGISTERED_DETAIL: &str =
    "Este correo electrónico ya está en uso. Por favor, intenta iniciar sesión.";
pub const CHECK_YOUR_EMAIL: &str = "¡Revisa tu correo!";
pub const CHECK_YOUR_EMAIL_DETAIL: &str =
    "Te hemos enviado un enlace de confirmación para activar tu cuenta.";
pub const SIGN_IN_FAILED: &str = "Inicio de sesión fallido";
pub const INVALID_CREDENTIALS: &str = "Credenciales incorrectas.";
pub const WELCOME_BACK: &str = "¡Bienvenido de nuevo!";
pub const SIGN_OUT_FAILED: &str = "Cierre de sesión fallido";

// --- Profiles ---
pub const ERROR: &str = "Error";
pub const PROFILE_LOAD_FAILED: &str = "No se pudo cargar el perfil";

// --- Stories ---
pub const UNTITLED_STORY: &str = "Historia sin título";
pub const INVALID_COVER_FORMAT: &str = "Formato de archivo no válido. Solo PNG, JPG, JPEG.";
pub const CHAPTER_ORDER_NOT_SAVED: &str = "No se pudo guardar el orden de los capítulos.";
pub const STORY_SAVED: &str = "Historia guardada";
pub const CHAPTER_SAVED: &str = "Capítulo guardado";
pub const CHAPTER_PUBLISHED: &str = "Capítulo publicado";

// --- Chat ---
pub const NEW_CHAT_TITLE: &str = "Nuevo Chat";
pub const ASSISTANT_GREETING: &str =
    "¡Hola! Soy Folky, tu guía literario en Folklore 📚✨. ¿Sobre qué quieres saber?";
pub const ASSISTANT_PERSONA: &str = "Eres Folky, un asistente amigable, útil y creativo para un sitio web de escritura llamado Folklore. Responde de manera concisa y amigable.";
pub const ASSISTANT_PERSONA_ACK: &str =
    "¡Entendido! Soy Folky, tu guía literario en Folklore 📚✨. Estoy listo para ayudar.";
pub const ASSISTANT_FALLBACK: &str = "Lo siento, algo salió mal. Intenta de nuevo más tarde.";
pub const DIRECT_GREETING: &str = "Aún no hay mensajes. ¡Escribe el primero!";
pub const DIRECT_UNAVAILABLE: &str =
    "Los mensajes directos todavía no se entregan. Tu mensaje quedó guardado.";
