//! Local caption generation used whenever the remote text path fails.
//!
//! Two tiers per style: a pre-generated library keyed by product display name,
//! then a compositional engine that draws one fragment from each of five
//! ordered pools. Neither tier touches the network and the engine never fails.

use std::collections::HashMap;

use include_dir::{include_dir, Dir};
use rand::Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::models::CaptionStyle;
use crate::prompt::{fill_product, pick_random};

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");
const LIBRARY_FILE: &str = "copy_library.json";

/// Five fragment pools, concatenated in field order.
#[derive(Debug)]
pub struct PhrasePool {
    pub openers: &'static [&'static str],
    pub pains: &'static [&'static str],
    pub transitions: &'static [&'static str],
    pub benefits: &'static [&'static str],
    pub closings: &'static [&'static str],
}

impl PhrasePool {
    pub fn for_style(style: CaptionStyle) -> &'static PhrasePool {
        match style {
            CaptionStyle::ConfidentProfessional => &CONFIDENT_PROFESSIONAL,
            CaptionStyle::AestheticOriental => &AESTHETIC_ORIENTAL,
            CaptionStyle::IngredientExplainer => &INGREDIENT_EXPLAINER,
        }
    }

    /// `None` if any pool is empty.
    pub fn compose<R: Rng + ?Sized>(&self, product_name: &str, rng: &mut R) -> Option<String> {
        let mut raw = String::new();
        for pool in [self.openers, self.pains, self.transitions, self.benefits, self.closings] {
            raw.push_str(pick_random(pool, rng)?);
        }
        Some(fill_product(&raw, product_name))
    }
}

static CONFIDENT_PROFESSIONAL: PhrasePool = PhrasePool {
    openers: &[
        "过了35岁，我不再相信“一夜回春”，只相信“长期主义”给的定力。",
        "在名利场待久了才明白：真正的奢侈不是Logo，而是“掌控感”。",
        "成年人的安全感，一半来自存款，一半来自皮肤的“稳”。",
        "关掉朋友圈，推掉无效社交，今晚只留给自己。",
        "与其在焦虑里跟风刷酸，不如稳扎稳打地重建秩序。",
    ],
    pains: &[
        "连轴转的项目把我榨得只剩一口气，",
        "镜子里熬夜后暗下去的脸色骗不了人，",
        "换季那点小情绪和泛红又找上门，",
        "跨洋航班的十几个小时里，",
        "结束一场极度消耗的谈判后，",
    ],
    transitions: &[
        "好在手边有这瓶佰草集修源五行{product}。",
        "接住我所有疲惫的，是佰草集修源五行{product}。",
        "我想起老祖宗的智慧，拿出了这瓶{product}。",
        "随手拿起的{product}，成了那晚的底气。",
        "幸好包里常备着修源五行{product}。",
    ],
    benefits: &[
        "它不做浮于表面的修饰，给的是深层的“支撑力”：人参的元气，灵芝的安稳。",
        "温润的包裹感一点点抚平燥热，不急不躁，把好状态慢慢养回来。",
        "没有猛药的刺激，只有润物细无声的滋养。第二天醒来，脸是软的，心是静的。",
        "它像一位情绪稳定的老友，默默修护屏障，替我守住防线。",
        "坚持用完半瓶，那种由内而外的透亮，是装不出来的。",
    ],
    closings: &[
        "在不确定的世界里，拥有一张“稳”得住的脸，就是对生活最好的掌控。",
        "流水不争先，争的是滔滔不绝。护肤如此，人生亦然。",
        "你只管努力，剩下的交给时间，和它。",
        "原来，从容才是最高级的美。",
        "最好的投资，永远是投资自己。",
    ],
};

static AESTHETIC_ORIENTAL: PhrasePool = PhrasePool {
    openers: &[
        "黄昏，点一盏灯，卸下一日的浮躁。",
        "万物速朽的年代，我们都需要一份源于自然的恒常。",
        "雨后的清晨，空气里有泥土和草木的气息。",
        "真正的养肤，是一场五感的修行。",
        "慢下来，去感受一朵花开的时间。",
    ],
    pains: &[
        "指尖触到佰草集修源五行{product}的温润，",
        "旋开{product}的瓶盖，草药香若有似无，",
        "取一泵{product}在掌心慢慢焐热，",
        "{product}触肤的那一刻，",
        "在这座快得停不下来的城市里，",
    ],
    transitions: &[
        "草本的香气缓缓散开，先苦后甘，像极了生活本身。",
        "仿佛置身长白山的深林，呼吸都变得深长。",
        "人参、灵芝、牡丹……天地的馈赠，此刻化作能量沁入肌理。",
        "没有香精的廉价感，只有草木最本真的味道。",
        "这不只是护肤，更像一场微小的仪式。",
    ],
    benefits: &[
        "这不是简单的涂抹，而是一次与肌肤的深谈。",
        "每一寸肌肤都在安静地呼吸，吸饱了五行的灵气。",
        "干燥与粗糙被一点点抚平，只留下如玉的温润。",
        "那份安心，像回到小时候外婆的怀抱。",
        "肌肤喝饱了水，透出瓷器般细腻的光泽。",
    ],
    closings: &[
        "心静了，世界就静了。",
        "于方寸之间，见天地辽阔。",
        "这一刻，我找回了久违的自己。",
        "美，本就是一种自然的平衡。",
        "愿你也能在喧嚣里，修得一份自在。",
    ],
};

static INGREDIENT_EXPLAINER: PhrasePool = PhrasePool {
    openers: &[
        "总有人问我，为什么国货现在这么能打？",
        "别再盲目刷酸了，你的屏障可能正在“裸奔”。",
        "扒了上百个配方，我找到一个被低估的宝藏。",
        "听一句劝：抗老不一定靠猛药，维稳才是硬道理。",
        "护肤界的“特种兵”，我只服这一瓶。",
    ],
    pains: &[
        "答案就在佰草集修源五行{product}里。",
        "直到我认真研究了佰草集修源五行{product}。",
        "看完{product}的成分表，我直呼内行。",
        "这瓶{product}的思路非常超前。",
        "敏感肌、熬夜党，真的可以试试{product}。",
    ],
    transitions: &[
        "别被“中草药”三个字吓退，它的逻辑很现代：把它想成给皮肤细胞喝的“超级补剂”就对了。",
        "人参负责“充电”，让细胞干活更有劲；灵芝负责“灭火”，把小情绪按下去。",
        "比起单打独斗的单一成分，“五行组方”更像给皮肤请了一支中医团队，整体调理。",
        "专利微囊把活性成分包起来，像快递的保温箱，送到该去的地方才打开。",
        "五种草本协同作战，分工明确，效率比单一成分高得多。",
    ],
    benefits: &[
        "用下来最直观的结果：脸不容易泛红了，透出的是健康的光泽。",
        "原本粗糙的颗粒感没了，摸上去像剥了壳的鸡蛋。",
        "细纹不会立刻消失，但整张脸确实“嘭”起来了。",
        "换季的时候它最让我安心。稳，就是最大的赢。",
        "抗氧、修护、滋润，一瓶全包圆了。",
    ],
    closings: &[
        "成分党可以放心入。",
        "这才是真正懂中国皮肤的护肤品。",
        "把脸交给它，我很放心。",
        "不玩虚的，效果看得见。",
        "用一次，你就懂我在说什么。",
    ],
};

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawLibrary(HashMap<String, HashMap<CaptionStyle, Vec<String>>>);

/// Pre-generated captions: product display name -> style -> captions.
/// Read-only after load.
#[derive(Debug, Default, Clone)]
pub struct PhraseLibrary {
    entries: HashMap<String, HashMap<CaptionStyle, Vec<String>>>,
}

impl PhraseLibrary {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let RawLibrary(mut entries) = serde_json::from_str::<RawLibrary>(raw)?;
        for styles in entries.values_mut() {
            for captions in styles.values_mut() {
                captions.retain(|c| !c.trim().is_empty());
            }
            styles.retain(|_, captions| !captions.is_empty());
        }
        entries.retain(|_, styles| !styles.is_empty());
        Ok(Self { entries })
    }

    /// The library compiled into the binary. An unreadable file yields an
    /// empty library so the compositional tier takes over.
    pub fn embedded() -> Self {
        let Some(raw) = ASSETS.get_file(LIBRARY_FILE).and_then(|f| f.contents_utf8()) else {
            warn!("⚠️ {} is not embedded, phrase library is empty", LIBRARY_FILE);
            return Self::default();
        };
        match Self::from_json(raw) {
            Ok(library) => {
                info!("📚 Loaded phrase library for {} products", library.entries.len());
                library
            }
            Err(e) => {
                warn!("⚠️ Failed to parse {}: {}", LIBRARY_FILE, e);
                Self::default()
            }
        }
    }

    pub fn captions(&self, product_name: &str, style: CaptionStyle) -> &[String] {
        self.entries
            .get(product_name)
            .and_then(|styles| styles.get(&style))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub fn terminal_caption(product_name: &str) -> String {
    format!("佰草集修源五行{product_name}，五大仙草，温润养护，给肌肤刚刚好的滋养。")
}

pub struct CopyEngine {
    library: PhraseLibrary,
    pools: fn(CaptionStyle) -> &'static PhrasePool,
}

impl CopyEngine {
    pub fn new(library: PhraseLibrary) -> Self {
        Self { library, pools: PhrasePool::for_style }
    }

    #[cfg(test)]
    fn with_pools(library: PhraseLibrary, pools: fn(CaptionStyle) -> &'static PhrasePool) -> Self {
        Self { library, pools }
    }

    pub fn caption<R: Rng + ?Sized>(&self, product_name: &str, style: CaptionStyle, rng: &mut R) -> String {
        if let Some(caption) = pick_random(self.library.captions(product_name, style), rng) {
            return fill_product(caption, product_name);
        }
        if let Some(caption) = (self.pools)(style).compose(product_name, rng) {
            return caption;
        }
        warn!(style = style.id(), "⚠️ Phrase pools are empty, using terminal caption");
        terminal_caption(product_name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::prompt::PRODUCT_PLACEHOLDER;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    static EMPTY: PhrasePool = PhrasePool { openers: &[], pains: &[], transitions: &[], benefits: &[], closings: &[] };

    static ALL_PLACEHOLDERS: PhrasePool = PhrasePool {
        openers: &["[{product}]", "<{product}>"],
        pains: &["a", "b"],
        transitions: &["{product}!", "{product}?"],
        benefits: &["c"],
        closings: &["d", "e"],
    };

    fn empty_pools(_: CaptionStyle) -> &'static PhrasePool {
        &EMPTY
    }

    fn placeholder_pools(_: CaptionStyle) -> &'static PhrasePool {
        &ALL_PLACEHOLDERS
    }

    #[test]
    fn compositional_output_varies_for_every_style() {
        let engine = CopyEngine::new(PhraseLibrary::default());
        let mut rng = rand::thread_rng();
        for style in CaptionStyle::ALL {
            let outputs: HashSet<String> = (0..20).map(|_| engine.caption("仙草乳", style, &mut rng)).collect();
            assert!(outputs.len() >= 2, "{style:?} produced a single caption");
            for caption in &outputs {
                assert!(!caption.contains(PRODUCT_PLACEHOLDER));
                assert!(!caption.is_empty());
            }
        }
    }

    #[test]
    fn placeholders_are_replaced_by_product_name() {
        let engine = CopyEngine::with_pools(PhraseLibrary::default(), placeholder_pools);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let caption = engine.caption("仙草水", CaptionStyle::IngredientExplainer, &mut rng);
            assert_eq!(caption.matches("仙草水").count(), 2);
            assert!(!caption.contains(PRODUCT_PLACEHOLDER));
        }
    }

    #[test]
    fn fragments_are_concatenated_in_pool_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let caption = ALL_PLACEHOLDERS.compose("X", &mut rng).unwrap();
        assert!(caption.starts_with("[X]") || caption.starts_with("<X>"));
        assert!(caption.ends_with('d') || caption.ends_with('e'));
        assert!(caption.contains('c'));
    }

    #[test]
    fn seeded_source_is_reproducible() {
        let engine = CopyEngine::new(PhraseLibrary::default());
        let a = engine.caption("仙草霜", CaptionStyle::AestheticOriental, &mut StdRng::seed_from_u64(99));
        let b = engine.caption("仙草霜", CaptionStyle::AestheticOriental, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn library_entry_wins_over_composition() {
        let library = PhraseLibrary::from_json(
            r#"{ "仙草油": { "styleB": ["油一", "油二 {product}"] } }"#,
        )
        .unwrap();
        let engine = CopyEngine::new(library);
        let mut rng = StdRng::seed_from_u64(5);
        let outputs: HashSet<String> =
            (0..20).map(|_| engine.caption("仙草油", CaptionStyle::AestheticOriental, &mut rng)).collect();
        assert_eq!(outputs, HashSet::from(["油一".to_string(), "油二 仙草油".to_string()]));
    }

    #[test]
    fn missing_library_entry_falls_back_to_composition() {
        let library = PhraseLibrary::from_json(r#"{ "仙草油": { "aesthetic-oriental": ["only B"] } }"#).unwrap();
        let engine = CopyEngine::new(library);
        let mut rng = StdRng::seed_from_u64(5);

        let caption = engine.caption("仙草油", CaptionStyle::ConfidentProfessional, &mut rng);
        assert!(!caption.is_empty());
        assert_ne!(caption, "only B");

        let caption = engine.caption("仙草霜", CaptionStyle::AestheticOriental, &mut rng);
        assert_ne!(caption, "only B");
    }

    #[test]
    fn blank_library_entries_count_as_absent() {
        let library = PhraseLibrary::from_json(r#"{ "仙草霜": { "styleA": ["", "   "] } }"#).unwrap();
        assert!(library.captions("仙草霜", CaptionStyle::ConfidentProfessional).is_empty());
    }

    #[test]
    fn empty_tiers_yield_terminal_caption() {
        let engine = CopyEngine::with_pools(PhraseLibrary::default(), empty_pools);
        let caption = engine.caption("仙草霜", CaptionStyle::ConfidentProfessional, &mut StdRng::seed_from_u64(0));
        assert_eq!(caption, terminal_caption("仙草霜"));
        assert!(caption.contains("仙草霜"));
    }

    #[test]
    fn embedded_library_covers_every_product_and_style() {
        let library = PhraseLibrary::embedded();
        for product in crate::catalog::PRODUCTS {
            for style in CaptionStyle::ALL {
                let captions = library.captions(product.name, style);
                assert!(captions.len() >= 3, "{} / {:?} has {} captions", product.name, style, captions.len());
                assert!(captions.iter().all(|c| c.contains(product.name)));
            }
        }
    }

    #[test]
    fn style_pools_are_non_empty() {
        for style in CaptionStyle::ALL {
            let pool = PhrasePool::for_style(style);
            for fragments in [pool.openers, pool.pains, pool.transitions, pool.benefits, pool.closings] {
                assert!(!fragments.is_empty());
            }
        }
    }
}
