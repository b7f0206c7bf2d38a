use serde::Serialize;

pub const DEFAULT_SIZE_HINT: &str = "100ml bottle, approximately 13-15cm tall";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub sub: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub size_hint: &'static str,
}

pub const PRODUCTS: [Product; 4] = [
    Product {
        id: "cream",
        name: "仙草霜",
        sub: "年轻嘭弹",
        description: "5大仙草入霜，促生紧实胶原",
        size_hint: "50ml cream jar, approximately 4.5-5cm tall, wide and short shape",
    },
    Product {
        id: "water",
        name: "仙草水",
        sub: "细腻柔光",
        description: "16万仙草油啵啵，透老醇萃98.7%",
        size_hint: "120ml toner bottle, approximately 13-15cm tall, slender cylindrical shape",
    },
    Product {
        id: "oil",
        name: "仙草油",
        sub: "紧透生光",
        description: "60%高浓仙草油，99%天然植萃油",
        size_hint: "30ml oil bottle, approximately 8-10cm tall, small elegant bottle",
    },
    Product {
        id: "lotion",
        name: "仙草乳",
        sub: "紧透弹嫩",
        description: "5大仙草组方，专利微囊包裹",
        size_hint: "100ml lotion bottle, approximately 13-15cm tall, medium pump bottle",
    },
];

pub fn find(id: &str) -> Option<&'static Product> {
    PRODUCTS.iter().find(|p| p.id == id)
}

/// Physical size hint for the image prompt, looked up by display name.
pub fn size_hint_for(name: &str) -> &'static str {
    PRODUCTS
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.size_hint)
        .unwrap_or(DEFAULT_SIZE_HINT)
}
