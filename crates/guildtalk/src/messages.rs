//! User-visible reply texts.

use crate::config::{GenerationConfig, GuildId};
use crate::engine::ModelCatalog;
use core::time::Duration;

pub(crate) fn settings_block(header: &str, config: &GenerationConfig) -> String {
    format!(
        "**{header}:**\n```N Samples: {}\nMax Length: {}\nTemperature: {}\nTop K: {}\nModel: {}```",
        config.nsamples, config.length, config.temperature, config.top_k, config.model_name
    )
}

pub(crate) fn help(models: &ModelCatalog) -> String {
    let available = if models.is_empty() {
        "no models are installed".to_string()
    } else {
        let names: Vec<_> = models.iter().map(|m| format!("`{m}`")).collect();
        format!("available models are {}", names.join(", "))
    };
    format!(
        "Configure the bot session by typing: `!setconfig <nsamples> <length> <temperature> <topk> <model>`.\n\
         `nsamples` = Number of samples to generate\n\
         `length` = Estimate on how much to generate after your prompt\n\
         `temperature` = Lower temperature results in less random completions. As the temperature \
         approaches zero, the model will become deterministic and repetitive. Higher temperature \
         results in more random completions.\n\
         `topk` = Integer value controlling diversity. 1 means only 1 word is considered for each \
         step (token), resulting in deterministic completions, while 40 means 40 words are \
         considered at each step. 0 is a special setting meaning no restrictions. 40 generally is \
         a good value.\n\
         `model` = Set which model is used for generating text. The larger the model, the longer \
         it will take to generate\n\
         {available}\n\
         Get current state by `!getconfig`."
    )
}

pub(crate) fn initialized(guilds: usize) -> String {
    format!("Generation sessions initialized for {guilds} guild(s)")
}

pub(crate) fn talk_header(guild_id: GuildId) -> String {
    format!("```Guild: {guild_id}\nMessage received, generating response...```")
}

pub(crate) fn talk_footer(elapsed: Duration, length: usize) -> String {
    format!(
        "```Response generated in: {:.2} seconds.\nResponse length: {length}```",
        elapsed.as_secs_f64()
    )
}

pub(crate) const SETTING_CONFIGURATION: &str = "Setting configuration. Please wait...";
pub(crate) const CONFIGURATION_SET: &str = "Successfully set configuration!";
pub(crate) const DEFAULT_SET: &str = "Succesfully set `default` configuration!";
pub(crate) const PROCESS_INTENSIVE: &str =
    "The configuration parameters are process intensive, responses may take a while.";

pub(crate) const LIMITS_DISABLED: &str =
    "`CAUTION! Size limits are disabled. Please be considerate of everyone else who uses this. :)`";
pub(crate) const VERBOSE_SETTING: &str = "`Setting configuration. Please wait...`";
pub(crate) const VERBOSE_RELEASING: &str = "`Releasing current model...`";
pub(crate) const VERBOSE_PREINIT: &str = "`Pre-initializing model...`";
pub(crate) const VERBOSE_BUILDING: &str = "`Setting up new model...`";
pub(crate) const VERBOSE_SET: &str = "`Successfully set configuration!`";

pub(crate) fn verbose_cost_warning(config: &GenerationConfig, cost: u64, threshold: u64) -> String {
    format!(
        "`nsamples: {} * length: {} ({cost}) is above the warning threshold of {threshold}`\n\
         `The configuration parameters are process intensive, responses may take a while...`",
        config.nsamples, config.length
    )
}

pub(crate) fn configuration_failed(error: &crate::Error) -> String {
    format!("Configuration failed: {error}")
}
