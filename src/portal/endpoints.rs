//! Candidate request variants per portal operation
//!
//! Each operation lists the query strings known to work on some deployment, most
//! common first. The client walks the list until one yields a usable payload.

use crate::models::MacAuthContext;
use crate::portal::identity::STB_SERIAL;

/// Suffix every portal request carries
pub const JS_HTTP_REQUEST: &str = "JsHttpRequest=1-xml";

pub const PROFILE_VERSION: &str = "ImageDescription:0.2.18-r23-250;ImageDate:Thu Sep 13 11:31:16 EEST 2018;PORTAL version:5.5.0;API Version:JS API version:343;STB API version:146;Player Engine version:0x58c";

const HW_VERSION_2: &str = "e35eb542450b97c61341f7aa8208c2ec93c40966";
const PREHASH: &str = "0f745136d021752337aba35d49bbb23327902654";
const METRICS_RANDOM: &str = "e19ac8911689fb4432bab570f0ec9dcada70ea3f";

/// Portal operations with their own candidate lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Handshake,
    Profile,
    AccountInfo,
    Channels,
    Genres,
    CreateLink,
    Epg,
    VodCategories,
    VodItems,
    SeriesCategories,
    SeriesItems,
    SeriesSeasons,
}

/// Full request URL for a candidate query
pub fn request_url(base: &str, query: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}&{JS_HTTP_REQUEST}")
}

pub fn handshake() -> Vec<String> {
    vec![
        "type=stb&action=handshake&token=".to_string(),
        "type=stb&action=handshake".to_string(),
        format!("type=stb&action=handshake&token=&prehash={PREHASH}"),
    ]
}

pub fn profile(mac: &str, auth: &MacAuthContext) -> Vec<String> {
    let metrics = format!(
        r#"{{"mac":"{mac}","sn":"{STB_SERIAL}","type":"STB","model":"MAG250","uid":"","random":"{METRICS_RANDOM}"}}"#
    );
    let full = format!(
        "type=stb&action=get_profile&hd=1&ver={ver}&num_banks=2&sn={STB_SERIAL}&stb_type=MAG200\
         &client_type=STB&image_version=218&video_out=hdmi&device_id={device_id}&device_id2={device_id2}\
         &signature={signature}&auth_second_step=1&hw_version=1.7-BD-00&not_valid_token=0\
         &metrics={metrics}&hw_version_2={HW_VERSION_2}&timestamp={timestamp}&api_signature=262\
         &prehash={PREHASH}",
        ver = urlencoding::encode(PROFILE_VERSION),
        device_id = auth.device_id,
        device_id2 = auth.device_id2,
        signature = auth.signature,
        metrics = urlencoding::encode(&metrics),
        timestamp = auth.timestamp,
    );
    vec![full, "type=stb&action=get_profile".to_string()]
}

pub fn account_info() -> Vec<String> {
    vec!["type=account_info&action=get_main_info".to_string()]
}

pub fn channels() -> Vec<String> {
    vec![
        "type=itv&action=get_all_channels&force_ch_link_check=".to_string(),
        "type=itv&action=get_all_channels".to_string(),
        "type=itv&action=get_ordered_list&genre=*&force_ch_link_check=&fav=0&p=0".to_string(),
    ]
}

pub fn genres() -> Vec<String> {
    vec![
        "type=itv&action=get_genres".to_string(),
        "action=get_genres&type=itv".to_string(),
    ]
}

/// `create_link` for live channels (`media_type` "itv") and VOD (`media_type` "vod")
pub fn create_link(media_type: &str, cmd: &str, series: u32) -> Vec<String> {
    let cmd = urlencoding::encode(cmd);
    vec![
        format!(
            "type={media_type}&action=create_link&cmd={cmd}&series={series}&forced_storage=0&disable_ad=0&download=0&force_ch_link_check=0"
        ),
        format!("type={media_type}&action=create_link&cmd={cmd}&series={series}"),
    ]
}

pub fn epg(period_hours: u32) -> Vec<String> {
    vec![format!("type=itv&action=get_epg_info&period={period_hours}")]
}

/// `media_type` is "vod" or "series"
pub fn categories(media_type: &str) -> Vec<String> {
    vec![
        format!("type={media_type}&action=get_categories"),
        format!("type={media_type}&action=get_genres"),
    ]
}

pub fn ordered_list(media_type: &str, category: &str, page: u32) -> Vec<String> {
    let category = urlencoding::encode(category);
    vec![
        format!("type={media_type}&action=get_ordered_list&category={category}&p={page}"),
        format!("type={media_type}&action=get_ordered_list&genre={category}&p={page}"),
    ]
}

pub fn seasons(series_id: &str) -> Vec<String> {
    let series_id = urlencoding::encode(series_id);
    vec![format!(
        "type=series&action=get_ordered_list&movie_id={series_id}&season_id=0&episode_id=0&p=1"
    )]
}
