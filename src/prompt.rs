use rand::{seq::SliceRandom, Rng};

use crate::catalog;
use crate::models::{CaptionStyle, GenerationRequest, ImagePart, PromptPayload};

/// Scene buffers at or below this many bytes are treated as absent.
pub const SCENE_NOISE_THRESHOLD: usize = 75;
pub const ASPECT_RATIO: &str = "1:1";
pub const IMAGE_SIZE_TIER: &str = "1K";
pub const PRODUCT_PLACEHOLDER: &str = "{product}";

const MATERIAL_RULES: &[&str] = &[
    "- **MATERIAL**: Premium Matte White Porcelain (温润白瓷质感).",
    "- **TEXTURE**: Jade-like finish, soft diffusion, NOT glossy plastic.",
    "- **COLOR**: Warm White / Creamy White (Old Paper Tone). NOT bright blue-white.",
    "- **FEEL**: Heavy, expensive, luxury ancient Chinese ceramic feel.",
    "- STRICTLY FORBIDDEN: Shiny plastic look, overly reflective surfaces, cold blue lighting.",
    "- The bottle must look like it is made of \"Dehua White Porcelain\" (德化白瓷).",
];

const BOTANICALS: [(&str, &str); 5] = [
    ("长白山人参 (Ginseng root)", "left side"),
    ("灵芝 (Lingzhi)", "right side"),
    ("牡丹花瓣 (Peony petals)", "scattered"),
    ("紫苏叶 (Perilla leaves)", "near product"),
    ("北五味子 (Schisandra berries)", "small cluster"),
];

const BACKDROPS: &[&str] = &[
    "Marble counter with soft morning window light",
    "Wooden vanity table with golden hour sunlight",
    "Stone spa surface in a zen setting",
    "Elegant tea table with natural elements",
];

/// Uniform draw from a fixed pool. `None` only for an empty pool.
pub fn pick_random<'a, T, R: Rng + ?Sized>(pool: &'a [T], rng: &mut R) -> Option<&'a T> {
    pool.choose(rng)
}

pub fn fill_product(template: &str, product_name: &str) -> String {
    template.replace(PRODUCT_PLACEHOLDER, product_name)
}

pub fn has_scene(scene: Option<&[u8]>) -> bool {
    scene.is_some_and(|bytes| bytes.len() > SCENE_NOISE_THRESHOLD)
}

/// 1-based positions of each attached image, in attachment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ordinals {
    product: usize,
    scene: Option<usize>,
    brand_mark: Option<usize>,
}

/// Builds the image payload. Parts are attached first and the instruction text
/// is rendered from the resulting ordinals, so "IMAGE n" always matches.
pub fn compose_image_prompt(request: &GenerationRequest) -> PromptPayload {
    let mut parts = vec![ImagePart::jpeg(request.product_reference.clone())];
    let product = parts.len();

    let scene = match &request.scene_image {
        Some(scene) if has_scene(Some(scene.as_ref())) => {
            parts.push(ImagePart::jpeg(scene.clone()));
            Some(parts.len())
        }
        _ => None,
    };

    let brand_mark = match &request.brand_mark {
        Some(mark) if !mark.is_empty() => {
            parts.push(ImagePart::png(mark.clone()));
            Some(parts.len())
        }
        _ => None,
    };

    let ordinals = Ordinals { product, scene, brand_mark };
    let size_hint = catalog::size_hint_for(&request.product_name);
    PromptPayload {
        instruction_text: render_image_instruction(&request.product_name, size_hint, ordinals),
        parts,
    }
}

fn render_image_instruction(product_name: &str, size_hint: &str, ord: Ordinals) -> String {
    let mut lines: Vec<String> = Vec::new();
    let p = ord.product;

    match ord.scene {
        Some(_) => lines.push("You are a MASTER COMMERCIAL PHOTOGRAPHER creating a premium skincare product image.".into()),
        None => lines.push("You are a MASTER COMMERCIAL PHOTOGRAPHER creating a premium skincare product image with a DREAMY BACKGROUND.".into()),
    }
    lines.push(String::new());
    lines.push(format!("BRAND: Premium Skincare (Product: {product_name})"));
    lines.push(format!("PRODUCT SIZE: {size_hint}"));
    lines.push(String::new());

    lines.push("INPUT IMAGES:".into());
    lines.push(format!("- IMAGE {p}: Product bottle ({size_hint}) - Shape Reference"));
    if let Some(s) = ord.scene {
        lines.push(format!("- IMAGE {s}: Environment scene (your shooting location)"));
    }
    if let Some(b) = ord.brand_mark {
        lines.push(format!("- IMAGE {b}: High-Res Brand Logo (Reference for bottle details)"));
    }
    lines.push(String::new());

    lines.push("CRITICAL: PRODUCT ACCURACY".into());
    lines.push(format!("The product bottle in IMAGE {p} MUST be reproduced with EXACT accuracy:"));
    lines.push("- Bottle shape, proportions, and silhouette must match EXACTLY".into());
    lines.push("- Label design, text, and graphics must be IDENTICAL".into());
    lines.push("- Color scheme must be PRECISE".into());
    lines.push("- Cap/lid design must match EXACTLY".into());
    lines.push("- DO NOT alter, redesign, or \"improve\" the product appearance".into());
    if let Some(b) = ord.brand_mark {
        lines.push(format!(
            "- **RESTORE LOGO**: The logo on the bottle in IMAGE {p} might be low-res. Use the details from IMAGE {b} to render the branding sharply and accurately."
        ));
        lines.push(format!(
            "- **PERSPECTIVE**: Apply the logo from IMAGE {b} onto the curved surface of the bottle naturally."
        ));
    }
    lines.push("- **NO FLOATING TEXT**: Do not add random text, watermarks, or logos to the background or corners.".into());
    lines.push(String::new());

    lines.push("MATERIAL & COLOR COMPLIANCE:".into());
    lines.extend(MATERIAL_RULES.iter().map(|rule| rule.to_string()));
    lines.push(String::new());

    let mut step = 0;
    let mut next_step = |title: &str| {
        step += 1;
        format!("STEP {step}: {title}")
    };

    match ord.scene {
        Some(s) => {
            lines.push("YOUR TASK: CREATE A PROFESSIONAL PRODUCT PHOTOGRAPH".into());
            lines.push(String::new());
            lines.push(next_step(&format!("ANALYZE THE ENVIRONMENT (IMAGE {s})")));
            lines.push("- What type of scene is this? (tea house, café, natural setting, spa, etc.)".into());
            lines.push("- Identify the BEST SURFACE to place the product".into());
            lines.push("- Locate the LIGHT SOURCE and its direction".into());
            lines.push(String::new());
            lines.push(next_step("INTELLIGENT COMPOSITION"));
            lines.push("- Choose the optimal shooting position like a professional photographer".into());
            lines.push("- Background elements naturally BLURRED with depth of field".into());
        }
        None => {
            lines.push("YOUR TASK: CREATE BACKGROUND + PRODUCT IMAGE".into());
            lines.push(String::new());
            lines.push(next_step("CREATE A STUNNING INS-STYLE BACKGROUND"));
            lines.push("Since no environment photo is provided, CREATE a plausible lifestyle background.".into());
            lines.push("- Options (choose the most suitable):".into());
            lines.extend(BACKDROPS.iter().map(|b| format!("  * {b}")));
            lines.push("- Mood: Warm, inviting, luxurious, Oriental zen".into());
            lines.push("- Light: Soft, diffused, warm tone (golden hour preferred)".into());
        }
    }
    lines.push(String::new());

    lines.push(next_step("PRODUCT PLACEMENT"));
    lines.push(format!("- Place the EXACT product bottle from IMAGE {p} STANDING ON the surface"));
    lines.push("- Product MUST have a contact point (not floating!)".into());
    lines.push(format!("- **SCALE**: Match real dimensions ({size_hint})"));
    lines.push("- Cast a NATURAL CONTACT SHADOW".into());
    lines.push(String::new());

    lines.push(next_step("FIVE SACRED HERBS"));
    lines.push("Arrange naturally ON THE SURFACE around the product:".into());
    lines.extend(BOTANICALS.iter().map(|(herb, spot)| format!("- {herb} - {spot}")));
    lines.push("Each element: touches the surface, casts a shadow, looks fresh and real.".into());
    lines.push(String::new());

    lines.push(next_step("LIGHTING & SHADOWS"));
    lines.push("ALL elements share the SAME light source. Shadows point the SAME direction.".into());
    lines.push(String::new());

    lines.push(next_step("DEPTH OF FIELD"));
    lines.push("Product and herbs: SHARP. Background: naturally BLURRED (f/2.8-f/4).".into());
    lines.push(String::new());

    lines.push(next_step("CLEAN OUTPUT"));
    lines.push("- Do not invent extra text or watermarks anywhere in the image.".into());
    lines.push("- Keep the product label text visible and sharp.".into());
    lines.push(format!("OUTPUT: {ASPECT_RATIO} ratio photorealistic product image."));

    lines.join("\n")
}

/// Per-style caption recipe. Wording lives here so composition logic can be
/// tested without depending on it.
#[derive(Debug)]
pub struct CaptionTemplate {
    pub personas: &'static [&'static str],
    pub task: &'static str,
    pub rubric: &'static [&'static str],
    pub length_target: usize,
}

const TEMPLATES: [CaptionTemplate; 3] = [
    CaptionTemplate {
        personas: &[
            "你是一位35+的外企高管，见过大世面，懂得\"鉴赏\"而不只是\"购买\"。你反感制造焦虑，只信奉\"长期主义\"和\"掌控感\"。",
            "你是一位独立的时尚意见领袖，从不随波逐流。你认为护肤是\"自我投资\"的一部分。",
            "你是一位创业公司的女CEO，每天都在打仗。你要的不是\"安慰剂\"，而是能给你\"底气\"的战友。",
        ],
        task: "请写一段关于佰草集修源五行【{product}】的私房话。",
        rubric: &[
            "**拒绝焦虑词汇**：不要用\"急救\"、\"烂脸\"这类词，改用\"重塑秩序\"、\"内在支撑\"、\"回血\"。",
            "**独特金句**：至少一句能被记住的人生箴言，把护肤上升到人生哲学。",
            "**克制的高级感**：像在私人会所里低声告诉闺蜜，而不是卖场叫卖。",
        ],
        length_target: 280,
    },
    CaptionTemplate {
        personas: &[
            "你是一位隐居在现代都市的茶道师，对气味和质地极其敏感。你认为护肤是一场\"五感的修行\"。",
            "你是一位古风摄影师，善于发现光影和意境之美。你眼中的护肤品，是草本能量的具象化。",
            "你是一位追求极简生活的作家，讨厌繁复的堆砌，只喜欢\"刚刚好\"的滋养。",
        ],
        task: "请写一篇关于佰草集修源五行【{product}】的生活美学随笔。",
        rubric: &[
            "**通感描写**：着重写草本的香气（苦后回甘）与质地的触感（温润如玉）。",
            "**意境**：不要掉书袋，写出\"空灵\"与\"留白\"，把五大仙草写成天地的馈赠。",
            "**情绪价值**：护肤是为了\"静心\"，在浮躁世界里找回内在的平衡。",
        ],
        length_target: 280,
    },
    CaptionTemplate {
        personas: &[
            "你是一位拥有百万粉丝的\"成分党\"博主，最擅长把晦涩的论文讲成\"人话\"。",
            "你是一位资深配方师，但你痛恨把护肤品说成化学实验。你喜欢打比方，让小白也能听懂。",
        ],
        task: "请写一篇关于佰草集修源五行【{product}】的深度科普，但要完全听得懂。",
        rubric: &[
            "**讲人话**：不要堆砌\"成纤维细胞\"、\"信号通路\"这种词，除非立刻解释。",
            "**善用比喻**：把\"修护屏障\"比作\"修城墙\"，把五大仙草比作\"给细胞喂的高级补品\"。",
            "**先结果后原因**：先说结果（脸稳了、亮了），再说原因（人参给了能量，灵芝安抚了情绪）。",
        ],
        length_target: 280,
    },
];

pub fn caption_template(style: CaptionStyle) -> &'static CaptionTemplate {
    match style {
        CaptionStyle::ConfidentProfessional => &TEMPLATES[0],
        CaptionStyle::AestheticOriental => &TEMPLATES[1],
        CaptionStyle::IngredientExplainer => &TEMPLATES[2],
    }
}

const TIMES: &[&str] = &["深夜加班后", "清晨醒来", "周末独处", "出差途中", "重要约会前"];
const MOODS: &[&str] = &["疲惫求安慰", "充满期待", "从容淡定", "略带焦虑", "极度自律"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SituationalContext {
    pub time: &'static str,
    pub mood: &'static str,
}

impl SituationalContext {
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            time: pick_random(TIMES, rng).copied().unwrap_or(TIMES[0]),
            mood: pick_random(MOODS, rng).copied().unwrap_or(MOODS[0]),
        }
    }

    pub fn clause(&self) -> String {
        format!("场景设定：{}，心情：{}。", self.time, self.mood)
    }
}

pub fn compose_caption_prompt<R: Rng + ?Sized>(
    style: CaptionStyle,
    product_name: &str,
    rng: &mut R,
) -> PromptPayload {
    let template = caption_template(style);
    let persona = pick_random(template.personas, rng).copied().unwrap_or_default();
    let context = SituationalContext::draw(rng);

    let mut text = String::new();
    text.push_str(persona);
    text.push('\n');
    text.push_str(&context.clause());
    text.push('\n');
    text.push_str(&fill_product(template.task, product_name));
    text.push_str("\n要求：\n");
    for rule in template.rubric {
        text.push_str("- ");
        text.push_str(rule);
        text.push('\n');
    }
    text.push_str(&format!(
        "- **{}字左右**，只输出文案正文，不要任何开场白或说明。",
        template.length_target
    ));

    PromptPayload::text_only(text)
}
