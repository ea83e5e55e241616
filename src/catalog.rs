//! The fixed catalog of selectable models.
//!
//! Descriptors are defined once at startup and never mutated; the order here
//! is the order the selection overlay presents them in.

/// One selectable model in the picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Unique id handed to the model runtime.
    pub id: &'static str,
    pub name: &'static str,
    pub size: &'static str,
    pub params: &'static str,
    pub speed: &'static str,
    pub description: &'static str,
    pub recommended: &'static str,
}

pub const CATALOG: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "SmolLM2-135M-Instruct-q0f16-MLC",
        name: "SmolLM 135M",
        size: "~80MB",
        params: "135M",
        speed: "Ultra Fast",
        description: "Tiniest model, lightning fast, good for simple tasks",
        recommended: "Quick responses, low bandwidth",
    },
    ModelDescriptor {
        id: "Qwen2-0.5B-Instruct-q4f16_1-MLC",
        name: "Qwen2 0.5B",
        size: "~300MB",
        params: "500M",
        speed: "Very Fast",
        description: "Small but capable, balanced performance",
        recommended: "General chat, quick tasks",
    },
    ModelDescriptor {
        id: "TinyLlama-1.1B-Chat-v0.4-q4f16_1-MLC",
        name: "TinyLlama 1.1B",
        size: "~600MB",
        params: "1.1B",
        speed: "Fast",
        description: "Good balance of speed and quality",
        recommended: "Conversations, basic coding",
    },
    ModelDescriptor {
        id: "Llama-3.2-1B-Instruct-q4f16_1-MLC",
        name: "Llama 3.2 1B",
        size: "~600MB",
        params: "1B",
        speed: "Fast",
        description: "Meta's efficient small model, high quality",
        recommended: "Conversations, reasoning",
    },
    ModelDescriptor {
        id: "gemma-2b-it-q4f16_1-MLC",
        name: "Gemma 2B",
        size: "~1.3GB",
        params: "2B",
        speed: "Fast",
        description: "Google's compact model, well-rounded",
        recommended: "General purpose, coding help",
    },
    ModelDescriptor {
        id: "Phi-2-q4f16_1-MLC",
        name: "Phi-2",
        size: "~1.5GB",
        params: "2.7B",
        speed: "Medium",
        description: "Microsoft's smart small model, great reasoning",
        recommended: "Math, coding, analysis",
    },
    ModelDescriptor {
        id: "Llama-3.2-3B-Instruct-q4f16_1-MLC",
        name: "Llama 3.2 3B",
        size: "~1.8GB",
        params: "3B",
        speed: "Medium",
        description: "Powerful small model from Meta",
        recommended: "Complex tasks, detailed responses",
    },
    ModelDescriptor {
        id: "Qwen2.5-3B-Instruct-q4f16_1-MLC",
        name: "Qwen2.5 3B",
        size: "~1.8GB",
        params: "3B",
        speed: "Medium",
        description: "Latest Qwen, excellent multilingual support",
        recommended: "Multi-language, detailed chat",
    },
    ModelDescriptor {
        id: "Phi-3-mini-4k-instruct-q4f16_1-MLC",
        name: "Phi-3 Mini",
        size: "~2.2GB",
        params: "3.8B",
        speed: "Medium",
        description: "Advanced reasoning, strong performance",
        recommended: "Complex reasoning, coding",
    },
    ModelDescriptor {
        id: "Mistral-7B-Instruct-v0.3-q4f16_1-MLC",
        name: "Mistral 7B",
        size: "~4GB",
        params: "7B",
        speed: "Slower (Powerful)",
        description: "Large powerful model, highest quality",
        recommended: "Best quality, complex tasks",
    },
    ModelDescriptor {
        id: "SmolLM2-360M-Instruct-q4f32_1-MLC",
        name: "SmolLM2-360M",
        size: "~300MB",
        params: "360M",
        speed: "Very Fast",
        description: "Small but capable, balanced performance",
        recommended: "General chat, quick tasks",
    },
];

/// Look up a descriptor by id. Stored ids that fail this lookup are treated
/// as absent, which forces re-selection.
pub fn find(id: &str) -> Option<&'static ModelDescriptor> {
    CATALOG.iter().find(|m| m.id == id)
}

/// Display name for an id, falling back to the id itself for status text.
pub fn display_name(id: &str) -> &str {
    find(id).map(|m| m.name).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<&str> = CATALOG.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn find_known_id() {
        let model = find("TinyLlama-1.1B-Chat-v0.4-q4f16_1-MLC").unwrap();
        assert_eq!(model.name, "TinyLlama 1.1B");
    }

    #[test]
    fn find_unknown_id_is_none() {
        assert!(find("not-a-model").is_none());
        assert!(find("").is_none());
    }

    #[test]
    fn catalog_order_is_stable() {
        assert_eq!(CATALOG[0].name, "SmolLM 135M");
        assert_eq!(CATALOG.last().unwrap().name, "SmolLM2-360M");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(display_name("mystery-model"), "mystery-model");
        assert_eq!(display_name("Phi-2-q4f16_1-MLC"), "Phi-2");
    }
}
